//! Karel as a WASM module for browser lessons.
//!
//! This crate exposes the validator and the execution environment via
//! `wasm-bindgen`. Each `KarelEnvironment` owns its own robot and world, so
//! several editors on one page never interfere. The page drives execution
//! with its own timer: call `tick()` every `step_delay_ms` while it returns
//! `true`.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { validate, KarelEnvironment } from 'karel-wasm';
//!
//! await init();
//!
//! const check = JSON.parse(validate("move()\nx = 1"));
//! // { valid: false, error: "Variable assignment is not allowed: ...", line: 2, ... }
//!
//! const env = new KarelEnvironment(worldJson);
//! env.set_source(editor.value);
//! env.run();
//! const timer = setInterval(() => {
//!   const again = env.tick();
//!   render(JSON.parse(env.world_json()), JSON.parse(env.state_json()));
//!   if (!again) clearInterval(timer);
//! }, env.step_delay_ms());
//! ```

use karel_eval::{Environment, EvalError, ExecutionConfig, Speed, TestWorld};
use karel_validator::ValidationOptions;
use karel_world::World;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

fn error_json(message: impl std::fmt::Display) -> String {
    serde_json::json!({ "error": message.to_string() }).to_string()
}

/// Validate a program against the Karel subset.
///
/// Returns a JSON string containing a `ValidationResult`:
/// ```json
/// { "valid": false, "error": "Import statements are not allowed", "line": 1,
///   "diagnostic": { "code": 200, "category": "validation", ... } }
/// ```
#[wasm_bindgen]
pub fn validate(source: &str) -> String {
    let result = karel_validator::validate(source);
    serde_json::to_string(&result).unwrap_or_else(|e| {
        format!(r#"{{"valid":false,"error":"Serialization error: {e}","line":1}}"#)
    })
}

/// Validate with per-exercise options, e.g.
/// `{"allowed_commands": ["move", "turn_left"]}`.
#[wasm_bindgen]
pub fn validate_with_options(source: &str, options_json: &str) -> String {
    let options: ValidationOptions = match serde_json::from_str(options_json) {
        Ok(options) => options,
        Err(e) => return error_json(format!("invalid validation options: {e}")),
    };
    let result = karel_validator::validate_with(source, &options);
    serde_json::to_string(&result).unwrap_or_else(error_json)
}

/// One lesson test world as JSON: the starting world and the world the
/// program should leave behind.
#[derive(Debug, Deserialize)]
struct TestWorldDoc {
    name: String,
    world: World,
    expected: World,
}

/// Run a program against lesson test worlds.
///
/// `tests_json` is an array of `{name, world, expected}`; `config_json` is an
/// `ExecutionConfig` document or empty for defaults. Returns the
/// `TestRunSummary` as JSON, or `{"error": ..., "line": ...}` when the
/// program is rejected.
#[wasm_bindgen]
pub fn run_tests(source: &str, tests_json: &str, config_json: &str) -> String {
    let docs: Vec<TestWorldDoc> = match serde_json::from_str(tests_json) {
        Ok(docs) => docs,
        Err(e) => return error_json(format!("invalid test worlds: {e}")),
    };
    match run_tests_inner(source, docs, config_json) {
        Ok(json) => json,
        Err(EvalError::Rejected(diagnostic)) => serde_json::json!({
            "error": diagnostic.message,
            "line": diagnostic.line(),
            "diagnostic": diagnostic,
        })
        .to_string(),
        Err(e) => error_json(e),
    }
}

fn run_tests_inner(
    source: &str,
    docs: Vec<TestWorldDoc>,
    config_json: &str,
) -> Result<String, EvalError> {
    let config = if config_json.trim().is_empty() {
        ExecutionConfig::default()
    } else {
        ExecutionConfig::from_json(config_json)?
    };
    let mut worlds = Vec::with_capacity(docs.len());
    for doc in docs {
        let world = doc.world.validated()?;
        let expected = doc.expected.validated()?;
        worlds.push(TestWorld::new(
            doc.name,
            world,
            karel_eval::expect_world(expected),
        ));
    }
    let summary = karel_eval::run_tests(source, &worlds, &config)?;
    Ok(serde_json::to_string(&summary)?)
}

/// The speed slider presets, position 0 first:
/// `[{"position": 0, "name": "instant", "label": "Instant", "delay_ms": 0}, ...]`.
#[wasm_bindgen]
pub fn speed_presets() -> String {
    let presets: Vec<_> = Speed::ALL
        .iter()
        .enumerate()
        .map(|(position, speed)| {
            serde_json::json!({
                "position": position,
                "name": speed,
                "label": speed.label(),
                "delay_ms": speed.delay_ms(),
            })
        })
        .collect();
    serde_json::Value::from(presets).to_string()
}

/// Return the crate version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// ══════════════════════════════════════════════════════════════════════════════
// KarelEnvironment
// ══════════════════════════════════════════════════════════════════════════════

/// One robot, one world, one program, driven by the page.
#[wasm_bindgen]
pub struct KarelEnvironment {
    env: Environment,
}

#[wasm_bindgen]
impl KarelEnvironment {
    /// Create an environment from a lesson world document.
    #[wasm_bindgen(constructor)]
    pub fn new(world_json: &str) -> Result<KarelEnvironment, JsError> {
        let world = World::from_json(world_json)?;
        Ok(Self {
            env: Environment::new(world),
        })
    }

    /// Create an environment with an `ExecutionConfig` document.
    pub fn with_config(world_json: &str, config_json: &str) -> Result<KarelEnvironment, JsError> {
        let world = World::from_json(world_json)?;
        let config = ExecutionConfig::from_json(config_json)?;
        Ok(Self {
            env: Environment::with_config(world, config),
        })
    }

    pub fn set_source(&mut self, source: &str) {
        self.env.set_source(source);
    }

    pub fn source(&self) -> String {
        self.env.source().to_string()
    }

    /// Restrict the exercise, e.g. `{"allowed_commands": ["move"]}`.
    pub fn set_options(&mut self, options_json: &str) -> Result<(), JsError> {
        let options: ValidationOptions = serde_json::from_str(options_json)?;
        self.env.set_options(options);
        Ok(())
    }

    /// Replace the world and make it the reset target.
    pub fn load_world(&mut self, world_json: &str) -> Result<(), JsError> {
        self.env.load_world_json(world_json)?;
        Ok(())
    }

    pub fn run(&mut self) {
        self.env.run();
    }

    pub fn step(&mut self) {
        self.env.step();
    }

    pub fn pause(&mut self) {
        self.env.pause();
    }

    pub fn reset(&mut self) {
        self.env.reset();
    }

    /// Advance one robot command. Returns whether another tick is due.
    pub fn tick(&mut self) -> bool {
        self.env.tick()
    }

    /// `idle`, `running`, `paused`, `error` or `success`.
    pub fn status(&self) -> String {
        self.env.status().to_string()
    }

    pub fn step_delay_ms(&self) -> u32 {
        u32::try_from(self.env.state().step_delay_ms).unwrap_or(u32::MAX)
    }

    pub fn set_step_delay_ms(&mut self, delay_ms: u32) {
        self.env.set_step_delay_ms(u64::from(delay_ms));
    }

    /// Pace continuous runs by slider position. Returns `false`, leaving
    /// the delay unchanged, past the last preset.
    pub fn set_speed(&mut self, position: u8) -> bool {
        let Some(speed) = Speed::from_slider(position) else {
            return false;
        };
        self.env.set_step_delay_ms(speed.delay_ms());
        true
    }

    /// The current world as a lesson JSON document.
    pub fn world_json(&self) -> String {
        self.env.world().to_json().unwrap_or_else(error_json)
    }

    /// The execution state as JSON.
    pub fn state_json(&self) -> String {
        serde_json::to_string(self.env.state()).unwrap_or_else(error_json)
    }

    /// The current world as a plain JS object.
    pub fn world(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.env.world()).map_err(Into::into)
    }

    /// The execution state as a plain JS object.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.env.state()).map_err(Into::into)
    }
}
