//! Company sales statistics and their cache.
//!
//! # Cache contract
//!
//! One entry per company, process-wide. A non-forced fetch returns the held
//! entry while it is younger than the TTL and performs no backend reads.
//! Otherwise the stats are recomputed from three sequential reads
//! (profile, then products, then orders) and the entry is overwritten with
//! the new computation time. A failed recompute leaves the previous entry
//! untouched.
//!
//! Concurrent misses for the same company are not merged; each caller runs
//! its own reads and the last one to finish wins.
//!
//! The map lock is held only for lookups and stores, never across a backend
//! call.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;
use verdant_core::{CompanyId, OrderId, OrderStatus, ProductId, StockStatus, UserId};

use super::ServiceError;
use crate::backend::{BackendClient, Bearer, Order, Product, Profile};
use crate::clock::Clock;

/// Days in the rolling order series.
pub const SERIES_DAYS: u32 = 7;

/// Orders listed under "recent".
pub const RECENT_ORDERS: usize = 5;

// =============================================================================
// Statistics
// =============================================================================

/// Sales of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub name: String,
    pub units_sold: i64,
    pub revenue: Decimal,
}

/// Orders placed on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyOrders {
    pub date: NaiveDate,
    pub orders: u32,
}

/// An order as seen by one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentOrder {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    /// Units of this company's products in the order.
    pub units: i64,
    /// Value of this company's lines only.
    pub amount: Decimal,
}

/// Dashboard figures for one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub company_id: CompanyId,
    pub total_products: usize,
    pub approved_products: usize,
    pub out_of_stock: usize,
    pub low_stock: usize,
    /// Non-cancelled orders with at least one of the company's products.
    pub total_orders: usize,
    /// Sum of the company's line totals over those orders.
    pub total_sales_amount: Decimal,
    /// Highest revenue first.
    pub product_sales: Vec<ProductSales>,
    /// Oldest day first, ending today.
    pub orders_last_7_days: Vec<DailyOrders>,
    /// Newest first.
    pub recent_orders: Vec<RecentOrder>,
}

impl DashboardStats {
    /// Aggregate a company's products and orders.
    ///
    /// Orders without any line of `company` are ignored entirely, so the
    /// caller may pass a superset.
    #[must_use]
    pub fn compute(company: CompanyId, products: &[Product], orders: &[Order], today: NaiveDate) -> Self {
        let own_products = products.iter().filter(|p| p.company_id == company);

        let mut total_products = 0;
        let mut approved_products = 0;
        let mut out_of_stock = 0;
        let mut low_stock = 0;
        let mut sales: HashMap<ProductId, ProductSales> = HashMap::new();

        for product in own_products {
            total_products += 1;
            if product.is_approved {
                approved_products += 1;
            }
            match product.stock_status() {
                StockStatus::OutOfStock => out_of_stock += 1,
                StockStatus::LowStock => low_stock += 1,
                StockStatus::InStock => {}
            }
            sales.insert(
                product.id,
                ProductSales {
                    product_id: product.id,
                    name: product.name.clone(),
                    units_sold: 0,
                    revenue: Decimal::ZERO,
                },
            );
        }

        let window_start = today - Duration::days(i64::from(SERIES_DAYS) - 1);
        let mut per_day: BTreeMap<NaiveDate, u32> = (0..i64::from(SERIES_DAYS))
            .map(|offset| (window_start + Duration::days(offset), 0))
            .collect();

        let mut total_orders = 0;
        let mut total_sales_amount = Decimal::ZERO;
        let mut touching: Vec<&Order> = Vec::new();

        for order in orders.iter().filter(|o| o.touches_company(company)) {
            touching.push(order);
            if order.status == OrderStatus::Cancelled {
                continue;
            }

            total_orders += 1;
            for item in order.items_for(company) {
                let line = item.line_total();
                total_sales_amount += line;
                let entry = sales.entry(item.product_id).or_insert_with(|| ProductSales {
                    product_id: item.product_id,
                    name: item.name.clone(),
                    units_sold: 0,
                    revenue: Decimal::ZERO,
                });
                entry.units_sold += i64::from(item.quantity);
                entry.revenue += line;
            }

            if let Some(count) = per_day.get_mut(&order.created_at.date_naive()) {
                *count += 1;
            }
        }

        let mut product_sales: Vec<ProductSales> = sales.into_values().collect();
        product_sales.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then_with(|| b.units_sold.cmp(&a.units_sold))
                .then_with(|| a.name.cmp(&b.name))
        });

        touching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let recent_orders = touching
            .into_iter()
            .take(RECENT_ORDERS)
            .map(|order| RecentOrder {
                id: order.id,
                created_at: order.created_at,
                status: order.status,
                units: order.items_for(company).map(|i| i64::from(i.quantity)).sum(),
                amount: order.items_for(company).map(|i| i.line_total()).sum(),
            })
            .collect();

        Self {
            company_id: company,
            total_products,
            approved_products,
            out_of_stock,
            low_stock,
            total_orders,
            total_sales_amount,
            product_sales,
            orders_last_7_days: per_day
                .into_iter()
                .map(|(date, orders)| DailyOrders { date, orders })
                .collect(),
            recent_orders,
        }
    }
}

// =============================================================================
// Data source
// =============================================================================

/// The three reads a recompute performs.
pub trait DashboardSource: Sync {
    /// The signed-in user's profile.
    fn profile(&self) -> impl Future<Output = Result<Profile, ServiceError>> + Send;

    /// All products of the company.
    fn products(&self, company: CompanyId) -> impl Future<Output = Result<Vec<Product>, ServiceError>> + Send;

    /// Orders touching the company.
    fn orders(&self, company: CompanyId) -> impl Future<Output = Result<Vec<Order>, ServiceError>> + Send;
}

/// Reads dashboard data from the backend as the signed-in company user.
pub struct BackendDashboardSource<'a> {
    backend: &'a BackendClient,
    user: UserId,
    access_token: &'a str,
}

impl<'a> BackendDashboardSource<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient, user: UserId, access_token: &'a str) -> Self {
        Self {
            backend,
            user,
            access_token,
        }
    }
}

impl DashboardSource for BackendDashboardSource<'_> {
    async fn profile(&self) -> Result<Profile, ServiceError> {
        self.backend
            .get_profile(self.user, Bearer::User(self.access_token))
            .await?
            .ok_or(ServiceError::NotFound("profile"))
    }

    async fn products(&self, company: CompanyId) -> Result<Vec<Product>, ServiceError> {
        Ok(self
            .backend
            .company_products(company, Bearer::User(self.access_token))
            .await?)
    }

    async fn orders(&self, company: CompanyId) -> Result<Vec<Order>, ServiceError> {
        Ok(self
            .backend
            .company_orders(company, Bearer::User(self.access_token))
            .await?)
    }
}

// =============================================================================
// Cache
// =============================================================================

/// A computed snapshot and when it was computed.
#[derive(Debug, Clone)]
pub struct CachedStats {
    pub stats: Arc<DashboardStats>,
    pub computed_at: DateTime<Utc>,
}

impl CachedStats {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.computed_at < ttl
    }
}

/// Process-wide dashboard statistics, one entry per company.
pub struct DashboardCache {
    entries: Mutex<HashMap<CompanyId, CachedStats>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DashboardCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CompanyId, CachedStats>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The held entry for a company, fresh or not.
    #[must_use]
    pub fn get(&self, company: CompanyId) -> Option<CachedStats> {
        self.lock().get(&company).cloned()
    }

    /// Drop a company's entry so the next fetch recomputes.
    pub fn invalidate(&self, company: CompanyId) {
        if self.lock().remove(&company).is_some() {
            tracing::debug!(company_id = %company, "Dashboard cache entry invalidated");
        }
    }

    /// Return the held entry if younger than `ttl` at `now`, else run `fetch`
    /// and store its result stamped with `now`.
    ///
    /// # Errors
    ///
    /// Propagates the error from `fetch`; the previous entry is kept.
    pub async fn refresh_if_stale<F, Fut>(
        &self,
        company: CompanyId,
        now: DateTime<Utc>,
        ttl: Duration,
        fetch: F,
    ) -> Result<CachedStats, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DashboardStats, ServiceError>>,
    {
        if let Some(entry) = self.get(company)
            && entry.is_fresh(now, ttl)
        {
            return Ok(entry);
        }
        self.recompute(company, now, fetch).await
    }

    async fn recompute<F, Fut>(
        &self,
        company: CompanyId,
        now: DateTime<Utc>,
        fetch: F,
    ) -> Result<CachedStats, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DashboardStats, ServiceError>>,
    {
        let stats = fetch().await.inspect_err(|e| {
            tracing::warn!(company_id = %company, error = %e, "Dashboard refresh failed");
        })?;
        let entry = CachedStats {
            stats: Arc::new(stats),
            computed_at: now,
        };
        self.lock().insert(company, entry.clone());
        Ok(entry)
    }

    /// Fetch a company's statistics through the cache.
    ///
    /// `force` skips the freshness check.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if the profile does not belong to `company`, or
    /// the error of the first failing read.
    #[instrument(skip(self, source), fields(company_id = %company))]
    pub async fn fetch<S: DashboardSource>(
        &self,
        company: CompanyId,
        source: &S,
        force: bool,
    ) -> Result<CachedStats, ServiceError> {
        let now = self.clock.now();
        let compute = || compute_stats(company, source, now.date_naive());
        if force {
            self.recompute(company, now, compute).await
        } else {
            self.refresh_if_stale(company, now, self.ttl, compute).await
        }
    }
}

async fn compute_stats<S: DashboardSource>(
    company: CompanyId,
    source: &S,
    today: NaiveDate,
) -> Result<DashboardStats, ServiceError> {
    let profile = source.profile().await?;
    if profile.company_id != Some(company) {
        return Err(ServiceError::Forbidden("dashboard belongs to another company"));
    }
    let products = source.products(company).await?;
    let orders = source.orders(company).await?;
    tracing::debug!(
        products = products.len(),
        orders = orders.len(),
        "Recomputing dashboard statistics"
    );
    Ok(DashboardStats::compute(company, &products, &orders, today))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use verdant_core::Address;

    use super::*;
    use crate::backend::OrderItem;
    use crate::clock::ManualClock;

    fn product(company: CompanyId, name: &str, stock: i32, approved: bool) -> Product {
        serde_json::from_value(serde_json::json!({
            "id": ProductId::random(),
            "company_id": company,
            "name": name,
            "original_price": "100",
            "stock_quantity": stock,
            "is_approved": approved,
        }))
        .unwrap()
    }

    fn order(lines: Vec<(CompanyId, ProductId, i64, i32)>, status: OrderStatus, at: DateTime<Utc>) -> Order {
        let items: Vec<OrderItem> = lines
            .into_iter()
            .map(|(company_id, product_id, price, quantity)| OrderItem {
                product_id,
                company_id,
                name: format!("item-{price}"),
                unit_price: Decimal::from(price),
                quantity,
                image: None,
            })
            .collect();
        let subtotal = items.iter().map(OrderItem::line_total).sum();
        Order {
            id: OrderId::random(),
            user_id: UserId::random(),
            items,
            shipping_address: Address {
                id: verdant_core::AddressId::random(),
                full_name: "A".to_owned(),
                phone: String::new(),
                line1: "1 Road".to_owned(),
                line2: None,
                landmark: None,
                city: "Pune".to_owned(),
                state: String::new(),
                pincode: "411001".to_owned(),
                country: "India".to_owned(),
                label: None,
                is_default: true,
            },
            subtotal,
            shipping_charge: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: subtotal,
            payment_id: None,
            gateway_order_id: None,
            status,
            created_at: at,
            updated_at: None,
        }
    }

    fn noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_three_order_example() {
        let a = CompanyId::random();
        let b = CompanyId::random();
        let (p1, p2, p3) = (ProductId::random(), ProductId::random(), ProductId::random());
        let orders = vec![
            order(vec![(a, p1, 200, 1)], OrderStatus::Confirmed, noon(10)),
            order(vec![(a, p2, 150, 2), (b, p3, 999, 1)], OrderStatus::Delivered, noon(11)),
            order(vec![(b, p3, 80, 5)], OrderStatus::Confirmed, noon(12)),
        ];

        let stats = DashboardStats::compute(a, &[], &orders, noon(12).date_naive());

        assert_eq!(stats.total_orders, 2);
        assert_eq!(stats.total_sales_amount, Decimal::from(500));
        assert_eq!(stats.recent_orders.len(), 2);
        assert_eq!(stats.product_sales[0].product_id, p2);
        assert_eq!(stats.product_sales[0].revenue, Decimal::from(300));
    }

    #[test]
    fn test_cancelled_orders_excluded_from_totals() {
        let a = CompanyId::random();
        let p = ProductId::random();
        let orders = vec![
            order(vec![(a, p, 100, 1)], OrderStatus::Cancelled, noon(10)),
            order(vec![(a, p, 100, 1)], OrderStatus::Shipped, noon(10)),
        ];
        let stats = DashboardStats::compute(a, &[], &orders, noon(10).date_naive());
        assert_eq!(stats.total_orders, 1);
        assert_eq!(stats.total_sales_amount, Decimal::from(100));
        assert_eq!(stats.recent_orders.len(), 2);
    }

    #[test]
    fn test_inventory_counts() {
        let a = CompanyId::random();
        let products = vec![
            product(a, "honey", 0, true),
            product(a, "ghee", 9, true),
            product(a, "jaggery", 10, false),
            product(CompanyId::random(), "other", 0, true),
        ];
        let stats = DashboardStats::compute(a, &products, &[], noon(1).date_naive());
        assert_eq!(stats.total_products, 3);
        assert_eq!(stats.approved_products, 2);
        assert_eq!(stats.out_of_stock, 1);
        assert_eq!(stats.low_stock, 1);
        assert_eq!(stats.product_sales.len(), 3);
        assert!(stats.product_sales.iter().all(|s| s.units_sold == 0));
    }

    #[test]
    fn test_seven_day_series() {
        let a = CompanyId::random();
        let p = ProductId::random();
        let orders = vec![
            order(vec![(a, p, 10, 1)], OrderStatus::Confirmed, noon(14)),
            order(vec![(a, p, 10, 1)], OrderStatus::Confirmed, noon(14)),
            order(vec![(a, p, 10, 1)], OrderStatus::Confirmed, noon(8)),
            // Outside the window.
            order(vec![(a, p, 10, 1)], OrderStatus::Confirmed, noon(7)),
        ];
        let stats = DashboardStats::compute(a, &[], &orders, noon(14).date_naive());

        let series = &stats.orders_last_7_days;
        assert_eq!(series.len(), 7);
        assert_eq!(series[0].date, noon(8).date_naive());
        assert_eq!(series[0].orders, 1);
        assert_eq!(series[6].date, noon(14).date_naive());
        assert_eq!(series[6].orders, 2);
        assert_eq!(series.iter().map(|d| d.orders).sum::<u32>(), 3);
    }

    struct CountingSource {
        company: CompanyId,
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingSource {
        fn new(company: CompanyId) -> Self {
            Self {
                company,
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    impl DashboardSource for CountingSource {
        async fn profile(&self) -> Result<Profile, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ServiceError::NotFound("profile"));
            }
            Ok(serde_json::from_value(serde_json::json!({
                "id": UserId::random(),
                "company_id": self.company,
            }))
            .unwrap())
        }

        async fn products(&self, company: CompanyId) -> Result<Vec<Product>, ServiceError> {
            Ok(vec![product(company, "honey", 3, true)])
        }

        async fn orders(&self, _company: CompanyId) -> Result<Vec<Order>, ServiceError> {
            Ok(Vec::new())
        }
    }

    fn cache(clock: &ManualClock) -> DashboardCache {
        DashboardCache::new(std::time::Duration::from_secs(300), Arc::new(clock.clone()))
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_without_reads() {
        let company = CompanyId::random();
        let clock = ManualClock::new(noon(1));
        let cache = cache(&clock);
        let source = CountingSource::new(company);

        let first = cache.fetch(company, &source, false).await.unwrap();
        clock.advance(Duration::minutes(4));
        let second = cache.fetch(company, &source, false).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.stats, &second.stats));
        assert_eq!(second.computed_at, noon(1));
    }

    #[tokio::test]
    async fn test_stale_or_forced_entry_is_recomputed() {
        let company = CompanyId::random();
        let clock = ManualClock::new(noon(1));
        let cache = cache(&clock);
        let source = CountingSource::new(company);

        cache.fetch(company, &source, false).await.unwrap();
        cache.fetch(company, &source, true).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        clock.advance(Duration::minutes(5));
        let entry = cache.fetch(company, &source, false).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(entry.computed_at, noon(1) + Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_entry() {
        let company = CompanyId::random();
        let clock = ManualClock::new(noon(1));
        let cache = cache(&clock);
        let source = CountingSource::new(company);

        let first = cache.fetch(company, &source, false).await.unwrap();
        source.fail.store(true, Ordering::SeqCst);
        assert!(cache.fetch(company, &source, true).await.is_err());

        let held = cache.get(company).unwrap();
        assert!(Arc::ptr_eq(&held.stats, &first.stats));
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let company = CompanyId::random();
        let clock = ManualClock::new(noon(1));
        let cache = cache(&clock);
        let source = CountingSource::new(company);

        cache.fetch(company, &source, false).await.unwrap();
        cache.invalidate(company);
        assert!(cache.get(company).is_none());
        cache.fetch(company, &source, false).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_company_profile_is_forbidden() {
        let clock = ManualClock::new(noon(1));
        let cache = cache(&clock);
        let source = CountingSource::new(CompanyId::random());

        let err = cache
            .fetch(CompanyId::random(), &source, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
