//! Case-insensitive symbol tables forming a single-parent chain.
//!
//! `declare` inserts into the innermost scope and rejects names that
//! already exist anywhere on the chain; `set` walks to the defining scope
//! and enforces type assignability plus an optional per-binding verify
//! callback (system variables use it to validate formatting strings).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::value::{Type, Value};

/// Verify callback invoked before a binding is assigned.
pub type VerifyFn = Rc<dyn Fn(&str, Type, &Value) -> Result<()>>;

/// A declared binding: its type, current value and optional verifier.
#[derive(Clone)]
pub struct Binding {
    /// Declared type.
    pub ty: Type,
    /// Current value.
    pub value: Value,
    verify: Option<VerifyFn>,
}

/// A scope in the chain. Cloning shares the underlying table.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    parent: Option<Scope>,
    bindings: RefCell<HashMap<String, Binding>>,
}

impl Scope {
    /// Creates a root scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                parent: None,
                bindings: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Creates a child of this scope.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                parent: Some(self.clone()),
                bindings: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Declares a name in this scope. Fails if the name already exists
    /// anywhere on the chain.
    pub fn declare(
        &self,
        name: &str,
        ty: Type,
        value: Value,
        verify: Option<VerifyFn>,
    ) -> Result<()> {
        let key = name.to_uppercase();
        if self.lookup(&key).is_some() {
            return Err(Error::InvalidArgument(format!("'{name}' already declared")));
        }
        self.inner
            .bindings
            .borrow_mut()
            .insert(key, Binding { ty, value, verify });
        Ok(())
    }

    /// Assigns a value, walking to the defining scope. Null is assignable
    /// to any declared type.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        let key = name.to_uppercase();
        let mut scope = self;
        loop {
            let found = scope
                .inner
                .bindings
                .borrow()
                .get(&key)
                .map(|b| (b.ty, b.verify.clone()));
            if let Some((declared, verify)) = found {
                if let Some(ty) = value.ty() {
                    if !declared.assignable_from(ty) {
                        return Err(Error::TypeMismatch(format!(
                            "cannot assign {ty} to {name} {declared}"
                        )));
                    }
                }
                if let Some(verify) = verify {
                    verify(&key, declared, &value)?;
                }
                if let Some(binding) = scope.inner.bindings.borrow_mut().get_mut(&key) {
                    binding.value = value;
                }
                return Ok(());
            }
            match &scope.inner.parent {
                Some(parent) => scope = parent,
                None => return Err(Error::UnboundIdentifier(name.to_string())),
            }
        }
    }

    /// Fetches a value, walking the chain.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lookup(&name.to_uppercase()).map(|b| b.value)
    }

    /// Fetches the declared type of a binding, walking the chain.
    #[must_use]
    pub fn binding_type(&self, name: &str) -> Option<Type> {
        self.lookup(&name.to_uppercase()).map(|b| b.ty)
    }

    /// Whether a name is declared anywhere on the chain.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(&name.to_uppercase()).is_some()
    }

    fn lookup(&self, key: &str) -> Option<Binding> {
        let mut scope = self;
        loop {
            if let Some(binding) = scope.inner.bindings.borrow().get(key) {
                return Some(binding.clone());
            }
            scope = scope.inner.parent.as_ref()?;
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}
