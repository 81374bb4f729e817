//! Orders and the delivery-eligibility check.

use serde::Deserialize;
use tracing::instrument;
use verdant_core::{CompanyId, OrderId, OrderStatus, UserId};

use super::rest::Query;
use super::types::{NewOrder, Order};
use super::{BackendClient, BackendError, Bearer, single};

/// Result of the delivery-eligibility function.
///
/// Older deployments return a bare boolean; newer ones an object with the
/// serviceable flag and a courier estimate.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EligibilityResponse {
    Flag(bool),
    Detailed {
        #[serde(alias = "eligible", alias = "serviceable")]
        is_eligible: bool,
    },
}

impl BackendClient {
    /// Record a paid order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the row.
    #[instrument(skip(self, order, bearer), fields(user_id = %order.user_id, total = %order.total_amount))]
    pub async fn insert_order(
        &self,
        order: &NewOrder,
        bearer: Bearer<'_>,
    ) -> Result<Order, BackendError> {
        let rows = self.insert("orders", order, bearer).await?;
        single(rows, "inserted order")
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(user_id = %user))]
    pub async fn user_orders(
        &self,
        user: UserId,
        bearer: Bearer<'_>,
    ) -> Result<Vec<Order>, BackendError> {
        let query = Query::table("orders")
            .select("*")
            .eq("user_id", user)
            .order("created_at", false);
        self.select(&query, bearer).await
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(order_id = %id))]
    pub async fn get_order(
        &self,
        id: OrderId,
        bearer: Bearer<'_>,
    ) -> Result<Option<Order>, BackendError> {
        let query = Query::table("orders").select("*").eq("id", id);
        self.select_one(query, bearer).await
    }

    /// Orders with at least one line of `company`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self, bearer), fields(company_id = %company))]
    pub async fn company_orders(
        &self,
        company: CompanyId,
        bearer: Bearer<'_>,
    ) -> Result<Vec<Order>, BackendError> {
        let needle = serde_json::json!([{ "company_id": company }]).to_string();
        let query = Query::table("orders")
            .select("*")
            .contains("items", &needle)
            .order("created_at", false);
        self.select(&query, bearer).await
    }

    /// Set an order's status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no visible order matched.
    #[instrument(skip(self, bearer), fields(order_id = %id, status = %status))]
    pub async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        bearer: Bearer<'_>,
    ) -> Result<Order, BackendError> {
        let body = serde_json::json!({ "status": status });
        let rows = self
            .update(&Query::table("orders").eq("id", id), &body, bearer)
            .await?;
        single(rows, "order")
    }

    /// Ask the backend whether a pincode is serviceable.
    ///
    /// # Errors
    ///
    /// Returns an error if the function call fails.
    #[instrument(skip(self, bearer))]
    pub async fn check_delivery_eligibility(
        &self,
        pincode: &str,
        bearer: Bearer<'_>,
    ) -> Result<bool, BackendError> {
        let args = serde_json::json!({ "pincode": pincode });
        let response: EligibilityResponse = self
            .rpc("check_delivery_eligibility", &args, bearer)
            .await?;
        Ok(match response {
            EligibilityResponse::Flag(flag) => flag,
            EligibilityResponse::Detailed { is_eligible } => is_eligible,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::backend::tests::client_for;

    #[tokio::test]
    async fn test_company_orders_filters_by_item_containment() {
        let company = CompanyId::random();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/orders")
            .match_query(Matcher::UrlEncoded(
                "items".into(),
                format!(r#"cs.[{{"company_id":"{company}"}}]"#),
            ))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let orders = client_for(&server)
            .company_orders(company, Bearer::User("t"))
            .await
            .unwrap();
        assert!(orders.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_eligibility_accepts_both_shapes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/check_delivery_eligibility")
            .match_body(Matcher::PartialJsonString(r#"{"pincode":"560001"}"#.into()))
            .with_status(200)
            .with_body(r#"{"serviceable": true, "estimated_days": 3}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/rest/v1/rpc/check_delivery_eligibility")
            .match_body(Matcher::PartialJsonString(r#"{"pincode":"999999"}"#.into()))
            .with_status(200)
            .with_body("false")
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(client.check_delivery_eligibility("560001", Bearer::Anon).await.unwrap());
        assert!(!client.check_delivery_eligibility("999999", Bearer::Anon).await.unwrap());
    }
}
