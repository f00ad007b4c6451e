//! The scope header injector and its per-client registry.
//!
//! Each [`StorageClient`] owns a [`HookRegistry`]. Attaching the scope machinery
//! to a client creates its [`ScopeStacks`] and a [`ScopeInjector`] that copies
//! the caller's scope headers onto every outgoing request they apply to.

use std::fmt;
use std::sync::{Arc, OnceLock};

use http::{HeaderName, HeaderValue};

use crate::{
    Error, HookConfig, Result, ScopeStacks, StorageClient, StorageRequest, TRACING_TARGET_HOOKS,
    codec,
};

/// Injects the merged headers of the caller's active scopes.
///
/// A scope only contributes to the operations listed by
/// [`codec::operations`] and, when it names a bucket, to requests on that
/// bucket. Existing request headers with the same name are overwritten.
/// Other headers are left alone, and nothing is added outside of any scope.
#[derive(Debug)]
pub struct ScopeInjector {
    stacks: Arc<ScopeStacks>,
    config: HookConfig,
}

impl ScopeInjector {
    /// Creates an injector reading from the given stacks.
    pub fn new(stacks: Arc<ScopeStacks>, config: HookConfig) -> Self {
        Self { stacks, config }
    }

    /// Returns the stacks this injector reads from.
    pub fn stacks(&self) -> &Arc<ScopeStacks> {
        &self.stacks
    }

    /// Returns the injector configuration.
    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    /// Adds the caller's scope headers to an outgoing request.
    ///
    /// # Errors
    ///
    /// Returns a header-injection error if a header cannot be represented;
    /// the request is left untouched.
    pub fn before_send(&self, request: &mut StorageRequest) -> Result<()> {
        if !self.config.applies_to(request.operation) {
            return Ok(());
        }

        let descriptors = self.stacks.active();
        let routed = descriptors
            .iter()
            .filter(|descriptor| descriptor.routes_to(request.bucket.as_deref()));
        let headers = codec::merge_for(routed, request.operation);
        if headers.is_empty() {
            return Ok(());
        }

        // Convert everything first so a bad value leaves the request untouched.
        let mut converted = Vec::with_capacity(headers.len());
        for (name, value) in &headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                Error::header_injection()
                    .with_message(format!("invalid header name '{name}'"))
                    .with_source(err)
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|err| {
                Error::header_injection()
                    .with_message(format!("invalid value for header '{name}'"))
                    .with_source(err)
            })?;
            converted.push((header_name, header_value));
        }

        for (name, value) in converted {
            request.headers.insert(name, value);
        }

        if self.config.log_values {
            tracing::debug!(
                target: TRACING_TARGET_HOOKS,
                operation = %request.operation,
                headers = ?headers,
                "Injected scope headers"
            );
        } else {
            tracing::debug!(
                target: TRACING_TARGET_HOOKS,
                operation = %request.operation,
                names = ?headers.keys().collect::<Vec<_>>(),
                "Injected scope headers"
            );
        }

        Ok(())
    }
}

/// Pre-send hook slot of one client instance.
///
/// Attaching twice, or from many threads at once, creates the injector once.
#[derive(Default)]
pub struct HookRegistry {
    injector: OnceLock<ScopeInjector>,
}

impl HookRegistry {
    /// Creates a registry with nothing attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the scope injector with the default configuration.
    pub fn attach(&self) -> Arc<ScopeStacks> {
        self.attach_with(HookConfig::default())
    }

    /// Attaches the scope injector and returns the client's scope stacks.
    ///
    /// The first call wins; later calls return the same stacks and ignore
    /// their configuration.
    pub fn attach_with(&self, config: HookConfig) -> Arc<ScopeStacks> {
        let mut attached = false;
        let injector = self.injector.get_or_init(|| {
            attached = true;
            ScopeInjector::new(Arc::new(ScopeStacks::new()), config.clone())
        });

        if attached {
            tracing::debug!(
                target: TRACING_TARGET_HOOKS,
                operations = ?injector.config().operations,
                "Attached scope injector"
            );
        } else if injector.config() != &config {
            tracing::warn!(
                target: TRACING_TARGET_HOOKS,
                "Scope injector already attached, ignoring new configuration"
            );
        }

        Arc::clone(injector.stacks())
    }

    /// Returns whether the scope injector is attached.
    pub fn is_attached(&self) -> bool {
        self.injector.get().is_some()
    }

    /// Returns the attached injector.
    pub fn injector(&self) -> Option<&ScopeInjector> {
        self.injector.get()
    }

    /// Returns the scope stacks, if the injector is attached.
    pub fn scopes(&self) -> Option<Arc<ScopeStacks>> {
        self.injector().map(|injector| Arc::clone(injector.stacks()))
    }

    /// Runs the injector, if attached.
    pub fn before_send(&self, request: &mut StorageRequest) -> Result<()> {
        let Some(injector) = self.injector() else {
            return Ok(());
        };

        injector.before_send(request).inspect_err(|err| {
            tracing::warn!(
                target: TRACING_TARGET_HOOKS,
                operation = %request.operation,
                error = %err,
                "Scope injector rejected request"
            );
        })
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Attaches the scope injector to a client and returns its scope stacks.
///
/// Idempotent per client instance.
pub fn attach<C: StorageClient + ?Sized>(client: &C) -> Arc<ScopeStacks> {
    client.hooks().attach()
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{Operation, ScopeDescriptor};

    fn request(operation: Operation) -> StorageRequest {
        StorageRequest::new(operation).with_bucket("b")
    }

    #[test]
    fn test_no_scope_no_headers() {
        let registry = HookRegistry::new();
        registry.attach();

        let mut req = request(Operation::GetObject);
        registry.before_send(&mut req).unwrap();
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_injects_active_scope_headers() {
        let registry = HookRegistry::new();
        let stacks = registry.attach();
        let token = stacks.push(ScopeDescriptor::fork("prod", Some("12345")).unwrap());

        let mut req = request(Operation::CreateBucket);
        registry.before_send(&mut req).unwrap();
        assert_eq!(req.headers["x-tigris-fork-source-bucket"], "prod");
        assert_eq!(req.headers["x-tigris-fork-source-bucket-snapshot"], "12345");

        stacks.pop(&token).unwrap();
        let mut req = request(Operation::CreateBucket);
        registry.before_send(&mut req).unwrap();
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_overwrites_without_removing() {
        let registry = HookRegistry::new();
        let stacks = registry.attach();
        let token = stacks.push(ScopeDescriptor::snapshot_read("b", "9").unwrap());

        let mut req = request(Operation::GetObject)
            .with_header("x-tigris-snapshot-version", HeaderValue::from_static("1"))
            .with_header("x-custom", HeaderValue::from_static("kept"));
        registry.before_send(&mut req).unwrap();

        assert_eq!(req.headers["x-tigris-snapshot-version"], "9");
        assert_eq!(req.headers["x-custom"], "kept");
        assert_eq!(req.headers.len(), 2);

        stacks.pop(&token).unwrap();
    }

    #[test]
    fn test_attach_is_idempotent() {
        let registry = HookRegistry::new();
        assert!(!registry.is_attached());

        let first = registry.attach();
        let second = registry.attach_with(HookConfig::new().with_log_values(true));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_attached());
        assert!(!registry.injector().unwrap().config().log_values);
    }

    #[test]
    fn test_concurrent_attach_registers_once() {
        let registry = Arc::new(HookRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.attach())
            })
            .collect();

        let stacks: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(stacks.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_operation_filter() {
        let registry = HookRegistry::new();
        let stacks =
            registry.attach_with(HookConfig::new().with_operations([Operation::CreateBucket]));
        let token = stacks.push(ScopeDescriptor::snapshot_enable());

        let mut create = request(Operation::CreateBucket);
        registry.before_send(&mut create).unwrap();
        assert_eq!(create.headers["x-tigris-enable-snapshot"], "true");

        let mut put = request(Operation::PutObject);
        registry.before_send(&mut put).unwrap();
        assert!(put.headers.is_empty());

        stacks.pop(&token).unwrap();
    }

    #[test]
    fn test_fork_headers_skip_object_writes() {
        let registry = HookRegistry::new();
        let stacks = registry.attach();
        let token = stacks.push(ScopeDescriptor::fork("prod", None).unwrap());

        let mut put = request(Operation::PutObject);
        registry.before_send(&mut put).unwrap();
        assert!(put.headers.is_empty());

        let mut delete = request(Operation::DeleteObject);
        registry.before_send(&mut delete).unwrap();
        assert!(delete.headers.is_empty());

        stacks.pop(&token).unwrap();
    }

    #[test]
    fn test_read_scope_routes_by_bucket() {
        let registry = HookRegistry::new();
        let stacks = registry.attach();
        let token = stacks.push(ScopeDescriptor::snapshot_read("b", "5").unwrap());

        let mut own = request(Operation::GetObject);
        registry.before_send(&mut own).unwrap();
        assert_eq!(own.headers["x-tigris-snapshot-version"], "5");

        let mut other = StorageRequest::new(Operation::GetObject).with_bucket("other");
        registry.before_send(&mut other).unwrap();
        assert!(other.headers.is_empty());

        let mut list = StorageRequest::new(Operation::ListBuckets);
        registry.before_send(&mut list).unwrap();
        assert_eq!(list.headers["x-tigris-snapshot"], "b");

        stacks.pop(&token).unwrap();
    }

    #[test]
    fn test_registries_are_independent() {
        let first = HookRegistry::new();
        let second = HookRegistry::new();
        let stacks = first.attach();
        second.attach();

        let token = stacks.push(ScopeDescriptor::snapshot_enable());
        let mut req = request(Operation::CreateBucket);
        second.before_send(&mut req).unwrap();
        assert!(req.headers.is_empty());

        stacks.pop(&token).unwrap();
    }
}
