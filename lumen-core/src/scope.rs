use crate::ast::Declaration;
use crate::error::{CompilerError, Result};
use indexmap::IndexMap;

/// Index of a scope inside a `ScopeTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// A single scope containing name bindings
#[derive(Debug, Clone)]
struct Scope {
    bindings: IndexMap<String, Declaration>,
    /// Non-owning link used for fallback lookup.
    parent: Option<ScopeId>,
}

/// Arena of lexical scopes.
///
/// Scopes are created and discarded in stack order while the analyzer walks
/// nested blocks, so a scope's parent always has a smaller id.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// Create a tree holding only the root scope
    pub fn new() -> Self {
        ScopeTree {
            scopes: vec![Scope {
                bindings: IndexMap::new(),
                parent: None,
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    /// Open a new scope nested in `parent`
    pub fn push_child(&mut self, parent: ScopeId) -> ScopeId {
        debug_assert!(parent.0 < self.scopes.len(), "parent scope was discarded");
        self.scopes.push(Scope {
            bindings: IndexMap::new(),
            parent: Some(parent),
        });
        ScopeId(self.scopes.len() - 1)
    }

    /// Drop `scope` and every scope created after it.
    pub fn discard(&mut self, scope: ScopeId) {
        debug_assert!(scope.0 > 0, "the root scope cannot be discarded");
        self.scopes.truncate(scope.0);
    }

    /// Bind `name` in `scope`. Shadowing an outer binding is allowed; a second
    /// binding in the same scope is not.
    pub fn add(&mut self, scope: ScopeId, name: &str, declaration: Declaration) -> Result<()> {
        let bindings = &mut self.scopes[scope.0].bindings;
        if bindings.contains_key(name) {
            return Err(CompilerError::DuplicateDeclaration(name.to_string(), None));
        }
        bindings.insert(name.to_string(), declaration);
        Ok(())
    }

    /// Look up a binding, searching from `scope` outward to the root.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<&Declaration> {
        self.resolve_with_scope(scope, name).map(|(_, decl)| decl)
    }

    /// Like `resolve`, also reporting which scope held the binding.
    pub fn resolve_with_scope(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, &Declaration)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let data = &self.scopes[id.0];
            if let Some(decl) = data.bindings.get(name) {
                return Some((id, decl));
            }
            current = data.parent;
        }
        None
    }

    /// Binding in `scope` itself, ignoring parents.
    pub fn resolve_local(&self, scope: ScopeId, name: &str) -> Option<&Declaration> {
        self.scopes[scope.0].bindings.get(name)
    }

    /// Bindings of one scope in insertion order.
    pub fn bindings(&self, scope: ScopeId) -> impl Iterator<Item = (&str, &Declaration)> {
        self.scopes[scope.0].bindings.iter().map(|(name, decl)| (name.as_str(), decl))
    }

    /// Number of live scopes, root included.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
