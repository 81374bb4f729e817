//! Application state shared across handlers.

use std::sync::Arc;

use verdant_core::MediaResolver;

use crate::backend::BackendClient;
use crate::clock::Clock;
use crate::config::StorefrontConfig;
use crate::services::catalog::{ProductCache, product_cache};
use crate::services::dashboard::DashboardCache;
use crate::services::invalidation::{CacheInvalidator, ChangeRevisions, InvalidationQueue};
use crate::services::payment::PaymentGateway;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// backend and gateway clients, the process-wide caches, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: BackendClient,
    media: MediaResolver,
    gateway: PaymentGateway,
    products: ProductCache,
    dashboard: Arc<DashboardCache>,
    revisions: Arc<ChangeRevisions>,
    invalidations: InvalidationQueue,
    clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Starts the change-notification debounce loop, so this must be called
    /// from within a Tokio runtime. The loop stops when the last clone of the
    /// state is dropped.
    #[must_use]
    pub fn new(config: StorefrontConfig, clock: Arc<dyn Clock>) -> Self {
        let backend = BackendClient::new(&config.backend);
        let media = backend.media_resolver(&config.media.bucket, &config.media.placeholder);
        let gateway = PaymentGateway::new(&config.payment);
        let products = product_cache();
        let dashboard = Arc::new(DashboardCache::new(
            config.dashboard_cache_ttl,
            Arc::clone(&clock),
        ));
        let revisions = Arc::new(ChangeRevisions::default());

        let sink = Arc::new(CacheInvalidator::new(
            products.clone(),
            Arc::clone(&dashboard),
            Arc::clone(&revisions),
        ));
        let (invalidations, _loop) = InvalidationQueue::spawn(sink, config.change_debounce);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                media,
                gateway,
                products,
                dashboard,
                revisions,
                invalidations,
                clock,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the backend client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Resolver for product image URLs.
    #[must_use]
    pub fn media(&self) -> &MediaResolver {
        &self.inner.media
    }

    #[must_use]
    pub fn gateway(&self) -> &PaymentGateway {
        &self.inner.gateway
    }

    /// Shared product listing cache.
    #[must_use]
    pub fn products(&self) -> &ProductCache {
        &self.inner.products
    }

    #[must_use]
    pub fn dashboard(&self) -> &DashboardCache {
        &self.inner.dashboard
    }

    #[must_use]
    pub fn revisions(&self) -> &ChangeRevisions {
        &self.inner.revisions
    }

    #[must_use]
    pub fn invalidations(&self) -> &InvalidationQueue {
        &self.inner.invalidations
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    /// Current Unix time in seconds, from the state's clock.
    #[must_use]
    pub fn now_unix(&self) -> i64 {
        self.inner.clock.now().timestamp()
    }
}
