//! Native tests for the browser bridge: JSON in, JSON out.

use karel_wasm::{
    run_tests, speed_presets, validate, validate_with_options, version, KarelEnvironment,
};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

const CORRIDOR: &str = r#"{
    "dimensions": {"width": 4, "height": 1},
    "karel": {"position": {"x": 1, "y": 1}, "direction": {"type": "east"}, "beepers": 0}
}"#;

const CORRIDOR_END: &str = r#"{
    "dimensions": {"width": 4, "height": 1},
    "karel": {"position": {"x": 4, "y": 1}, "direction": {"type": "east"}, "beepers": 0}
}"#;

const WALK: &str = "while front_is_clear():\n    move()\n";

fn parse(json: &str) -> Value {
    serde_json::from_str(json).expect("bridge returned invalid JSON")
}

fn fresh() -> KarelEnvironment {
    let Ok(env) = KarelEnvironment::new(CORRIDOR) else {
        panic!("valid world rejected");
    };
    env
}

fn env(source: &str) -> KarelEnvironment {
    let mut env = fresh();
    env.set_source(source);
    env.set_step_delay_ms(0);
    env
}

// ─────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_validate_accepts_program() {
    let result = parse(&validate(WALK));
    assert_eq!(result["valid"], true);
    assert!(result.get("error").is_none());
}

#[test]
fn test_validate_reports_line() {
    let result = parse(&validate("move()\nx = 1\n"));
    assert_eq!(result["valid"], false);
    assert_eq!(result["line"], 2);
    assert!(result["error"]
        .as_str()
        .unwrap()
        .starts_with("Variable assignment is not allowed"));
}

#[test]
fn test_validate_with_options() {
    let options = r#"{"allowed_commands": ["move"]}"#;
    assert_eq!(parse(&validate_with_options("move()", options))["valid"], true);
    let result = parse(&validate_with_options("turn_left()", options));
    assert_eq!(result["valid"], false);
    assert_eq!(result["diagnostic"]["code"], 220);
}

#[test]
fn test_validate_with_bad_options() {
    let result = parse(&validate_with_options("move()", "not json"));
    assert!(result["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid validation options"));
}

#[test]
fn test_version() {
    assert_eq!(version(), env!("CARGO_PKG_VERSION"));
}

// ─────────────────────────────────────────────────────────────────────
// Environment
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_environment_runs_on_ticks() {
    let mut env = env(WALK);
    assert_eq!(env.status(), "idle");
    env.run();
    assert_eq!(env.status(), "running");
    while env.tick() {}
    assert_eq!(env.status(), "success");

    let world = parse(&env.world_json());
    assert_eq!(world["karel"]["position"]["x"], 4);
    let state = parse(&env.state_json());
    assert_eq!(state["status"], "success");
    assert_eq!(state["current_line"], 2);
}

#[test]
fn test_environment_step_and_reset() {
    let mut env = env(WALK);
    env.step();
    env.step();
    assert_eq!(env.status(), "paused");
    assert_eq!(parse(&env.world_json())["karel"]["position"]["x"], 2);

    env.reset();
    assert_eq!(env.status(), "idle");
    assert_eq!(env.world_json(), fresh().world_json());
}

#[test]
fn test_environment_reports_fault() {
    let mut env = env("move()\nturn_left()\nmove()\n");
    env.run();
    while env.tick() {}
    assert_eq!(env.status(), "error");
    let state = parse(&env.state_json());
    assert_eq!(state["error_line"], 3);
    assert_eq!(state["diagnostic"]["code"], 301);
}

#[test]
fn test_environment_pause() {
    let mut env = env(WALK);
    env.run();
    assert!(env.tick());
    env.pause();
    assert_eq!(env.status(), "paused");
    assert!(!env.tick());
}

#[test]
fn test_step_delay_round_trips() {
    let mut env = env(WALK);
    env.set_step_delay_ms(150);
    assert_eq!(env.step_delay_ms(), 150);
    assert_eq!(parse(&env.state_json())["step_delay_ms"], 150);
}

#[test]
fn test_speed_slider_sets_delay() {
    let mut env = env(WALK);
    assert!(env.set_speed(1));
    assert_eq!(env.step_delay_ms(), 50);
    assert!(env.set_speed(5));
    assert_eq!(env.step_delay_ms(), 1000);

    assert!(!env.set_speed(6));
    assert_eq!(env.step_delay_ms(), 1000);
}

#[test]
fn test_speed_presets_json() {
    let presets = parse(&speed_presets());
    let presets = presets.as_array().unwrap();
    assert_eq!(presets.len(), 6);
    assert_eq!(presets[0]["name"], "instant");
    assert_eq!(presets[0]["delay_ms"], 0);
    assert_eq!(presets[3]["label"], "Normal");
    assert_eq!(presets[3]["delay_ms"], 300);
    assert_eq!(presets[4]["name"], "slow");
    assert_eq!(presets[5]["position"], 5);
    assert_eq!(presets[5]["label"], "Very Slow");
}

#[test]
fn test_environments_share_nothing() {
    let mut a = env(WALK);
    let mut b = env("turn_left()\n");
    a.run();
    b.run();
    while a.tick() {}
    while b.tick() {}
    assert_eq!(parse(&a.world_json())["karel"]["direction"]["type"], "east");
    assert_eq!(parse(&b.world_json())["karel"]["direction"]["type"], "north");
    assert_eq!(parse(&b.world_json())["karel"]["position"]["x"], 1);
}

#[test]
fn test_load_world_and_source() {
    let mut env = env("move()\n");
    assert_eq!(env.source(), "move()\n");
    assert!(env.load_world(CORRIDOR_END).is_ok());
    assert_eq!(parse(&env.world_json())["karel"]["position"]["x"], 4);
}

// ─────────────────────────────────────────────────────────────────────
// Test worlds
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_run_tests_json() {
    let tests = format!(
        r#"[{{"name": "walk", "world": {CORRIDOR}, "expected": {CORRIDOR_END}}},
           {{"name": "stay", "world": {CORRIDOR}, "expected": {CORRIDOR}}}]"#
    );
    let summary = parse(&run_tests(WALK, &tests, r#"{"step_delay_ms": 0}"#));
    assert_eq!(summary["passed"], 1);
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["results"][0]["name"], "walk");
    assert_eq!(summary["results"][0]["passed"], true);
    assert_eq!(summary["results"][1]["final_status"], "success");
}

#[test]
fn test_run_tests_rejected_program() {
    let tests = format!(r#"[{{"name": "walk", "world": {CORRIDOR}, "expected": {CORRIDOR_END}}}]"#);
    let result = parse(&run_tests("import os\n", &tests, ""));
    assert_eq!(result["line"], 1);
    assert_eq!(result["diagnostic"]["code"], 200);
}

#[test]
fn test_run_tests_bad_document() {
    let result = parse(&run_tests(WALK, "[{}]", ""));
    assert!(result["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid test worlds"));
}
