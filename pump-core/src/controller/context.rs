//! src/controller/context.rs
//! ============================================================================
//! Dispatch context stack.
//!
//! Every nested dispatch scope pushes a [`DispatchContext`]. On exit the
//! `mutated` flag is OR-ed into the parent; `skip_messages` never travels
//! upward. The root context lives as long as the stack and must never be
//! popped.

use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchContext {
    pub mutated: bool,
    pub skip_messages: bool,
}

#[derive(Debug)]
pub struct ContextStack {
    stack: Vec<DispatchContext>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self {
            stack: vec![DispatchContext::default()],
        }
    }

    /// Number of contexts including the root.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> DispatchContext {
        // The root is never popped, so the stack is never empty.
        self.stack[self.stack.len() - 1]
    }

    fn top_mut(&mut self) -> &mut DispatchContext {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Pushes a child context. `skip_messages` is inherited only from a
    /// non-root parent.
    pub fn push(&mut self, mutated: bool) {
        let skip_messages = self.stack.len() > 1 && self.top().skip_messages;
        self.stack.push(DispatchContext {
            mutated,
            skip_messages,
        });
    }

    /// Pops the top context and merges its `mutated` flag into the parent.
    ///
    /// # Panics
    /// Popping the root context means enter/exit calls are mismatched.
    pub fn pop(&mut self) -> DispatchContext {
        assert!(
            self.stack.len() > 1,
            "attempted to pop the root dispatch context"
        );
        let popped = self.stack.pop().unwrap_or_default();
        self.top_mut().mutated |= popped.mutated;
        popped
    }

    pub fn mutated(&self) -> bool {
        self.top().mutated
    }

    pub fn set_mutated(&mut self, mutated: bool) {
        self.top_mut().mutated = mutated;
    }

    pub fn skip_messages(&self) -> bool {
        self.top().skip_messages
    }

    pub fn set_skip_messages(&mut self, skip: bool) {
        self.top_mut().skip_messages = skip;
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII scope: pushes on creation, pops and merges on drop.
#[must_use = "dropping the scope immediately pops the context"]
pub struct DispatchScope<'a> {
    stack: &'a RefCell<ContextStack>,
}

impl<'a> DispatchScope<'a> {
    pub fn enter(stack: &'a RefCell<ContextStack>, mutated: bool) -> Self {
        stack.borrow_mut().push(mutated);
        Self { stack }
    }
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutated_propagates_upward() {
        let mut stack = ContextStack::new();
        stack.push(false);
        stack.push(true);
        stack.pop();
        assert!(stack.mutated());
        stack.pop();
        assert!(stack.mutated());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_skip_messages_is_not_inherited_from_root() {
        let mut stack = ContextStack::new();
        stack.set_skip_messages(true);
        stack.push(false);
        assert!(!stack.skip_messages());
    }

    #[test]
    fn test_skip_messages_is_inherited_from_nested_parent_but_not_propagated() {
        let mut stack = ContextStack::new();
        stack.push(false);
        stack.set_skip_messages(true);
        stack.push(false);
        assert!(stack.skip_messages());

        stack.set_skip_messages(false);
        stack.pop();
        assert!(stack.skip_messages());
        stack.pop();
        assert!(!stack.skip_messages());
    }

    #[test]
    #[should_panic(expected = "root dispatch context")]
    fn test_popping_root_is_fatal() {
        let mut stack = ContextStack::new();
        stack.pop();
    }

    #[test]
    fn test_scope_guard_pops_on_drop() {
        let stack = RefCell::new(ContextStack::new());
        {
            let _outer = DispatchScope::enter(&stack, false);
            {
                let _inner = DispatchScope::enter(&stack, true);
                assert_eq!(stack.borrow().depth(), 3);
            }
            assert!(stack.borrow().mutated());
        }
        assert_eq!(stack.borrow().depth(), 1);
        assert!(stack.borrow().mutated());
    }
}
