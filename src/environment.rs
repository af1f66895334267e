use std::collections::HashMap;

use crate::runtime::Value;

/// Handle to one scope record in the arena. Closures hold one of these
/// instead of a shared pointer, so a defining scope stays reachable for
/// as long as anything still names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvId(usize);

#[derive(Debug, Default)]
struct Scope {
    values: HashMap<String, Value>,
    parent: Option<EnvId>,
}

/// Arena of scope records forming the environment tree. The root scope
/// (`EnvId` 0) exists from construction; every other scope points at an
/// already-existing parent, so the chain is acyclic by construction.
#[derive(Debug, Default)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            scopes: vec![Scope::default()],
        }
    }

    pub fn root(&self) -> EnvId {
        EnvId(0)
    }

    /// Creates a fresh child scope of `parent` and returns its handle.
    pub fn push(&mut self, parent: EnvId) -> EnvId {
        self.scopes.push(Scope {
            values: HashMap::new(),
            parent: Some(parent),
        });
        EnvId(self.scopes.len() - 1)
    }

    /// Binds `name` in exactly the given scope. Redefinition in the same
    /// scope overwrites; it never errors and never touches enclosing
    /// scopes.
    pub fn define(&mut self, env: EnvId, name: impl Into<String>, value: Value) {
        self.scopes[env.0].values.insert(name.into(), value);
    }

    /// Resolves `name` by walking from `env` outward to the root.
    pub fn get(&self, env: EnvId, name: &str) -> Option<&Value> {
        let mut current = Some(env);
        while let Some(id) = current {
            if let Some(value) = self.scopes[id.0].values.get(name) {
                return Some(value);
            }
            current = self.scopes[id.0].parent;
        }
        None
    }

    /// Mutates the innermost existing binding of `name`, walking the
    /// chain like `get`. Returns false when no binding exists anywhere;
    /// assignment never creates one.
    pub fn assign(&mut self, env: EnvId, name: &str, value: Value) -> bool {
        let mut current = Some(env);
        while let Some(id) = current {
            if self.scopes[id.0].values.contains_key(name) {
                self.scopes[id.0].values.insert(name.to_string(), value);
                return true;
            }
            current = self.scopes[id.0].parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_get() {
        let mut envs = Environment::new();
        let root = envs.root();

        envs.define(root, "x", Value::Number(1.0));
        assert_eq!(envs.get(root, "x"), Some(&Value::Number(1.0)));
        assert_eq!(envs.get(root, "y"), None);

        // Redefinition in the same scope overwrites.
        envs.define(root, "x", Value::Number(2.0));
        assert_eq!(envs.get(root, "x"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_chain_lookup_and_shadowing() {
        let mut envs = Environment::new();
        let root = envs.root();
        let inner = envs.push(root);

        envs.define(root, "x", Value::Number(1.0));
        envs.define(root, "y", Value::Number(10.0));
        envs.define(inner, "x", Value::Number(2.0));

        // Inner shadows; outer is untouched.
        assert_eq!(envs.get(inner, "x"), Some(&Value::Number(2.0)));
        assert_eq!(envs.get(root, "x"), Some(&Value::Number(1.0)));

        // Lookup falls through to the enclosing scope.
        assert_eq!(envs.get(inner, "y"), Some(&Value::Number(10.0)));
    }

    #[test]
    fn test_assign_targets_innermost_existing_binding() {
        let mut envs = Environment::new();
        let root = envs.root();
        let inner = envs.push(root);

        envs.define(root, "x", Value::Number(1.0));
        assert!(envs.assign(inner, "x", Value::Number(5.0)));
        assert_eq!(envs.get(root, "x"), Some(&Value::Number(5.0)));

        // Assignment never creates a binding.
        assert!(!envs.assign(inner, "missing", Value::Void));
        assert_eq!(envs.get(inner, "missing"), None);
    }

    #[test]
    fn test_scopes_outlive_their_creation_point() {
        let mut envs = Environment::new();
        let root = envs.root();

        // A closure would retain this handle after the block "exits";
        // the record stays addressable.
        let captured = envs.push(root);
        envs.define(captured, "count", Value::Number(3.0));

        let later = envs.push(root);
        envs.define(later, "unrelated", Value::Boolean(true));

        assert_eq!(envs.get(captured, "count"), Some(&Value::Number(3.0)));
    }
}
