//! Customer and company order management.
//!
//! Status changes are checked against the lifecycle before anything is
//! written. The check reads the current row first, so two concurrent writers
//! can still race; the last write wins.

use serde::Serialize;
use tracing::instrument;
use verdant_core::{CompanyId, OrderId, OrderStatus, UserId};

use super::ServiceError;
use crate::backend::{BackendClient, Bearer, Order, OrderItem};

/// Check a status change.
///
/// # Errors
///
/// Returns `InvalidTransition` when the lifecycle does not allow it.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition { from, to })
    }
}

/// Customer-side orders.
pub struct CustomerOrders<'a> {
    backend: &'a BackendClient,
    user: UserId,
    access_token: &'a str,
}

impl<'a> CustomerOrders<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient, user: UserId, access_token: &'a str) -> Self {
        Self {
            backend,
            user,
            access_token,
        }
    }

    const fn bearer(&self) -> Bearer<'a> {
        Bearer::User(self.access_token)
    }

    /// Own orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn list(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(self.backend.user_orders(self.user, self.bearer()).await?)
    }

    /// One of the user's orders.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for missing orders and orders of other users.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn get(&self, id: OrderId) -> Result<Order, ServiceError> {
        self.backend
            .get_order(id, self.bearer())
            .await?
            .filter(|order| order.user_id == self.user)
            .ok_or(ServiceError::NotFound("order"))
    }

    /// Cancel an order that has not shipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once the order is past preparing.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn cancel(&self, id: OrderId) -> Result<Order, ServiceError> {
        let order = self.get(id).await?;
        check_transition(order.status, OrderStatus::Cancelled)?;
        let updated = self
            .backend
            .update_order_status(id, OrderStatus::Cancelled, self.bearer())
            .await?;
        tracing::info!(order_id = %id, from = %order.status, "Order cancelled by customer");
        Ok(updated)
    }
}

/// An order as a company sees it: only its own lines.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyOrderView {
    #[serde(flatten)]
    pub order: Order,
    /// Lines of this company.
    pub company_items: Vec<OrderItem>,
    /// Revenue from this company's lines.
    pub company_total: rust_decimal::Decimal,
}

impl CompanyOrderView {
    #[must_use]
    pub fn new(order: Order, company: CompanyId) -> Self {
        let company_items: Vec<OrderItem> = order.items_for(company).cloned().collect();
        let company_total = company_items.iter().map(OrderItem::line_total).sum();
        Self {
            order,
            company_items,
            company_total,
        }
    }
}

/// Company-side orders.
pub struct CompanyOrders<'a> {
    backend: &'a BackendClient,
    company: CompanyId,
    access_token: &'a str,
}

impl<'a> CompanyOrders<'a> {
    #[must_use]
    pub const fn new(backend: &'a BackendClient, company: CompanyId, access_token: &'a str) -> Self {
        Self {
            backend,
            company,
            access_token,
        }
    }

    const fn bearer(&self) -> Bearer<'a> {
        Bearer::User(self.access_token)
    }

    /// Orders with at least one of the company's products, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self), fields(company_id = %self.company))]
    pub async fn list(&self) -> Result<Vec<CompanyOrderView>, ServiceError> {
        let orders = self.backend.company_orders(self.company, self.bearer()).await?;
        Ok(orders
            .into_iter()
            .filter(|o| o.touches_company(self.company))
            .map(|o| CompanyOrderView::new(o, self.company))
            .collect())
    }

    /// Move an order to `status`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order has none of the company's lines and
    /// `InvalidTransition` for moves outside the lifecycle.
    #[instrument(skip(self), fields(company_id = %self.company))]
    pub async fn set_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<CompanyOrderView, ServiceError> {
        let order = self
            .backend
            .get_order(id, self.bearer())
            .await?
            .filter(|o| o.touches_company(self.company))
            .ok_or(ServiceError::NotFound("order"))?;
        check_transition(order.status, status)?;

        let updated = self
            .backend
            .update_order_status(id, status, self.bearer())
            .await?;
        tracing::info!(order_id = %id, from = %order.status, to = %status, "Order status changed");
        Ok(CompanyOrderView::new(updated, self.company))
    }

    /// Move an order one step forward.
    ///
    /// # Errors
    ///
    /// As [`Self::set_status`]; terminal orders report an invalid transition
    /// to themselves.
    pub async fn advance(&self, id: OrderId) -> Result<CompanyOrderView, ServiceError> {
        let current = self
            .backend
            .get_order(id, self.bearer())
            .await?
            .filter(|o| o.touches_company(self.company))
            .ok_or(ServiceError::NotFound("order"))?
            .status;
        let next = current.next().ok_or(ServiceError::InvalidTransition {
            from: current,
            to: current,
        })?;
        self.set_status(id, next).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::backend::tests::client_for;

    fn order_json(id: OrderId, user: UserId, company: CompanyId, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user,
            "items": [
                {"product_id": verdant_core::ProductId::random(), "company_id": company, "name": "Ghee", "unit_price": "300", "quantity": 2},
                {"product_id": verdant_core::ProductId::random(), "company_id": CompanyId::random(), "name": "Jaggery", "unit_price": "90", "quantity": 1},
            ],
            "shipping_address": {"full_name": "A", "line1": "1 St", "city": "Pune", "pincode": "411001"},
            "subtotal": "690",
            "shipping_charge": "0",
            "tax_amount": "0",
            "total_amount": "690",
            "status": status,
            "created_at": "2026-03-01T10:00:00Z",
        })
    }

    #[test]
    fn test_check_transition() {
        assert!(check_transition(OrderStatus::Preparing, OrderStatus::Cancelled).is_ok());
        assert!(matches!(
            check_transition(OrderStatus::Shipped, OrderStatus::Cancelled),
            Err(ServiceError::InvalidTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled
            })
        ));
    }

    #[test]
    fn test_company_view_only_counts_own_lines() {
        let company = CompanyId::random();
        let order: Order =
            serde_json::from_value(order_json(OrderId::random(), UserId::random(), company, "confirmed"))
                .unwrap();
        let view = CompanyOrderView::new(order, company);
        assert_eq!(view.company_items.len(), 1);
        assert_eq!(view.company_total, rust_decimal::Decimal::from(600));
    }

    #[tokio::test]
    async fn test_cancel_shipped_order_writes_nothing() {
        let (id, user) = (OrderId::random(), UserId::random());
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/orders")
            .match_query(Matcher::Any)
            .with_body(json!([order_json(id, user, CompanyId::random(), "shipped")]).to_string())
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/rest/v1/orders")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let backend = client_for(&server);
        let err = CustomerOrders::new(&backend, user, "t").cancel(id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn test_other_users_order_is_not_found() {
        let id = OrderId::random();
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/orders")
            .match_query(Matcher::Any)
            .with_body(json!([order_json(id, UserId::random(), CompanyId::random(), "pending")]).to_string())
            .create_async()
            .await;

        let backend = client_for(&server);
        let err = CustomerOrders::new(&backend, UserId::random(), "t").get(id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("order")));
    }

    #[tokio::test]
    async fn test_company_advances_confirmed_to_preparing() {
        let (id, user, company) = (OrderId::random(), UserId::random(), CompanyId::random());
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/orders")
            .match_query(Matcher::Any)
            .with_body(json!([order_json(id, user, company, "confirmed")]).to_string())
            .create_async()
            .await;
        let patch = server
            .mock("PATCH", "/rest/v1/orders")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({"status": "preparing"})))
            .with_body(json!([order_json(id, user, company, "preparing")]).to_string())
            .expect(1)
            .create_async()
            .await;

        let backend = client_for(&server);
        let view = CompanyOrders::new(&backend, company, "t").advance(id).await.unwrap();
        assert_eq!(view.order.status, OrderStatus::Preparing);
        patch.assert_async().await;
    }
}
