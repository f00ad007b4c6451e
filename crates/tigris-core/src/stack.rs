//! Per-client, per-context LIFO stacks of active scopes.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::codec::{self, HeaderSet};
use crate::{ContextId, Error, Result, ScopeDescriptor, TRACING_TARGET_STACK};

#[derive(Debug)]
struct Frame {
    id: u64,
    descriptor: ScopeDescriptor,
    released: bool,
}

/// Proof of one push, required to pop it again.
///
/// The token remembers the context it was pushed in, so popping works even
/// when the token travels to another thread.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a scope can only be popped with the token returned by its push"]
pub struct ScopeToken {
    context: ContextId,
    depth: usize,
    id: u64,
}

impl ScopeToken {
    /// Returns the context whose stack holds this scope.
    #[inline]
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Returns the stack depth right after the push (1 for the outermost scope).
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// All scope stacks of one client, keyed by execution context.
///
/// A context's stack is created on its first push and dropped again once its
/// last scope is popped. Contexts never observe each other's scopes, except
/// that a context created by [`isolate`](crate::isolate) also sees the scopes
/// of the contexts it was isolated from.
#[derive(Debug, Default)]
pub struct ScopeStacks {
    stacks: DashMap<ContextId, Vec<Frame>>,
    next_id: AtomicU64,
}

impl ScopeStacks {
    /// Creates an empty set of stacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a scope onto the caller's stack.
    pub fn push(&self, descriptor: ScopeDescriptor) -> ScopeToken {
        self.push_in(ContextId::current(), descriptor)
    }

    /// Pushes a scope onto the stack of an explicit context.
    pub fn push_in(&self, context: ContextId, descriptor: ScopeDescriptor) -> ScopeToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            target: TRACING_TARGET_STACK,
            %context,
            scope = %descriptor,
            "Pushing scope"
        );

        let mut stack = self.stacks.entry(context).or_default();
        stack.push(Frame {
            id,
            descriptor,
            released: false,
        });

        ScopeToken {
            context,
            depth: stack.len(),
            id,
        }
    }

    /// Pops the scope pushed with `token`.
    ///
    /// Scopes below it that were [released](Self::release) out of order are
    /// popped along with it.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::OrderingViolation`](crate::ErrorKind) when the
    /// token's scope is not the top of its stack; the stack is left unchanged.
    pub fn pop(&self, token: &ScopeToken) -> Result<ScopeDescriptor> {
        self.remove(token, false)
    }

    /// Pops the scope pushed with `token`, or marks it for removal if scopes
    /// entered after it are still active.
    ///
    /// A marked scope keeps contributing headers until every scope above it
    /// is popped, then it is popped too.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::OrderingViolation`](crate::ErrorKind) when the
    /// scope could not be popped right away or is no longer on the stack.
    pub fn release(&self, token: ScopeToken) -> Result<ScopeDescriptor> {
        self.remove(&token, true)
    }

    fn remove(&self, token: &ScopeToken, defer: bool) -> Result<ScopeDescriptor> {
        let Some(mut stack) = self.stacks.get_mut(&token.context) else {
            return Err(Error::ordering_violation().with_message(format!(
                "no active scopes in {} for token at depth {}",
                token.context, token.depth
            )));
        };

        let on_top = stack.last().is_some_and(|top| top.id == token.id);
        let frame = if on_top { stack.pop() } else { None };

        let Some(frame) = frame else {
            let depth = stack.len();
            let mut deferred = false;
            if defer
                && let Some(frame) = stack.iter_mut().find(|frame| frame.id == token.id)
            {
                frame.released = true;
                deferred = true;
            }
            drop(stack);

            tracing::error!(
                target: TRACING_TARGET_STACK,
                context = %token.context,
                token_depth = token.depth,
                stack_depth = depth,
                deferred,
                "Scope popped out of order"
            );

            return Err(Error::ordering_violation().with_message(format!(
                "scope at depth {} is not the top of {} (depth {})",
                token.depth, token.context, depth
            )));
        };

        while stack.last().is_some_and(|top| top.released) {
            if let Some(released) = stack.pop() {
                tracing::trace!(
                    target: TRACING_TARGET_STACK,
                    context = %token.context,
                    scope = %released.descriptor,
                    "Popped released scope"
                );
            }
        }

        let now_empty = stack.is_empty();
        drop(stack);

        if now_empty {
            self.stacks
                .remove_if(&token.context, |_, stack| stack.is_empty());
        }

        tracing::trace!(
            target: TRACING_TARGET_STACK,
            context = %token.context,
            scope = %frame.descriptor,
            "Popped scope"
        );

        Ok(frame.descriptor)
    }

    /// Returns the merged headers of the caller's active scopes.
    pub fn current_headers(&self) -> HeaderSet {
        codec::merge(&self.active())
    }

    /// Returns the merged headers of a context's own scopes.
    ///
    /// Descriptors are merged outermost to innermost, so the innermost scope
    /// wins for any header two scopes both produce.
    pub fn headers_in(&self, context: ContextId) -> HeaderSet {
        codec::merge(&self.active_in(context))
    }

    /// Returns the number of scopes visible to the caller.
    pub fn depth(&self) -> usize {
        ContextId::lineage()
            .into_iter()
            .map(|context| self.depth_in(context))
            .sum()
    }

    /// Returns the depth of a context's own stack.
    pub fn depth_in(&self, context: ContextId) -> usize {
        self.stacks.get(&context).map_or(0, |stack| stack.len())
    }

    /// Returns whether the caller has no active scopes.
    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Returns the caller's active descriptors, outermost first.
    pub fn active(&self) -> Vec<ScopeDescriptor> {
        ContextId::lineage()
            .into_iter()
            .flat_map(|context| self.active_in(context))
            .collect()
    }

    /// Returns a context's own descriptors, outermost first.
    pub fn active_in(&self, context: ContextId) -> Vec<ScopeDescriptor> {
        self.stacks
            .get(&context)
            .map(|stack| stack.iter().map(|frame| frame.descriptor.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of contexts with at least one active scope.
    pub fn context_count(&self) -> usize {
        self.stacks.len()
    }
}
