//! Name scopes and the global namespace a program runs in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use karel_world::Primitive;

use crate::value::Value;

/// One level of name bindings: the globals, or one function call.
#[derive(Debug, Default)]
pub struct Scope {
    vars: RefCell<HashMap<Rc<str>, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    /// A function-call scope nested in the scope its `def` ran in.
    pub(crate) fn child(parent: Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent: Some(parent),
        })
    }

    /// Resolve innermost first.
    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.vars.borrow().get(name) {
                return Some(value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    pub(crate) fn define(&self, name: Rc<str>, value: Value) {
        self.vars.borrow_mut().insert(name, value);
    }
}

/// The globals of a run: the robot commands and `range`, registered up
/// front, plus whatever the program binds at top level.
#[derive(Debug)]
pub struct Namespace {
    globals: Rc<Scope>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    /// A namespace with the builtins registered.
    pub fn new() -> Self {
        let namespace = Self {
            globals: Rc::new(Scope::default()),
        };
        namespace.register_builtins();
        namespace
    }

    /// Whether `name` is one of the fixed callables.
    pub fn is_builtin(name: &str) -> bool {
        name == karel_validator::RANGE || Primitive::from_name(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.lookup(name)
    }

    /// Names the program bound, sorted.
    pub fn user_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .globals
            .vars
            .borrow()
            .keys()
            .filter(|name| !Self::is_builtin(name))
            .map(|name| name.to_string())
            .collect();
        names.sort();
        names
    }

    /// Drop every binding the program made. Builtins stay.
    pub fn clear_transient(&self) {
        let removed = {
            let mut vars = self.globals.vars.borrow_mut();
            let before = vars.len();
            vars.retain(|name, _| Self::is_builtin(name));
            before - vars.len()
        };
        self.register_builtins();
        tracing::debug!(removed, "cleared program bindings");
    }

    pub(crate) fn globals(&self) -> &Rc<Scope> {
        &self.globals
    }

    fn register_builtins(&self) {
        for primitive in Primitive::ALL {
            self.globals
                .define(primitive.name().into(), Value::Primitive(primitive));
        }
        self.globals.define(karel_validator::RANGE.into(), Value::Range);
    }
}
