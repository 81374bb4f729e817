//! Table access over the backend's REST endpoint.

use std::fmt::Display;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{BackendClient, BackendError, Bearer};

/// A table read or write target with row filters.
///
/// Filters use the REST dialect directly: `eq.`, `in.(...)`, `ilike.` and
/// `cs.` (JSON containment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    params: Vec<(String, String)>,
}

impl Query {
    /// Start a query against `table`.
    #[must_use]
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_owned(),
            params: Vec::new(),
        }
    }

    /// Columns (and embedded relations) to return.
    #[must_use]
    pub fn select(self, columns: &str) -> Self {
        self.param("select", columns.to_owned())
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("eq.{value}"))
    }

    #[must_use]
    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("gte.{value}"))
    }

    /// Column value is one of `values`. An empty list matches nothing.
    #[must_use]
    pub fn in_list<T: Display>(self, column: &str, values: &[T]) -> Self {
        let list = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.param(column, format!("in.({list})"))
    }

    /// Case-insensitive substring match.
    #[must_use]
    pub fn ilike(self, column: &str, needle: &str) -> Self {
        // `*` is the wildcard; strip the reserved characters from user input.
        let cleaned: String = needle
            .chars()
            .filter(|c| !matches!(c, '*' | ',' | '(' | ')' | '%'))
            .collect();
        self.param(column, format!("ilike.*{cleaned}*"))
    }

    /// JSON/array column contains `json` (e.g. `["spices"]`).
    #[must_use]
    pub fn contains(self, column: &str, json: &str) -> Self {
        self.param(column, format!("cs.{json}"))
    }

    #[must_use]
    pub fn order(self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.param("order", format!("{column}.{direction}"))
    }

    #[must_use]
    pub fn limit(self, limit: usize) -> Self {
        self.param("limit", limit.to_string())
    }

    #[must_use]
    pub fn offset(self, offset: usize) -> Self {
        self.param("offset", offset.to_string())
    }

    fn param(mut self, key: &str, value: String) -> Self {
        self.params.push((key.to_owned(), value));
        self
    }

    fn path(&self) -> String {
        format!("/rest/v1/{}", self.table)
    }

    /// Query string parameters, in insertion order.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl BackendClient {
    /// Read rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or rows do not decode as `T`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        query: &Query,
        bearer: Bearer<'_>,
    ) -> Result<Vec<T>, BackendError> {
        let request = self
            .request(Method::GET, &query.path(), bearer)
            .query(query.params());
        self.send_json(request).await
    }

    /// Read at most one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the row does not decode.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        query: Query,
        bearer: Bearer<'_>,
    ) -> Result<Option<T>, BackendError> {
        let rows: Vec<T> = self.select(&query.limit(1), bearer).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one or more rows, returning them as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the insert.
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        bearer: Bearer<'_>,
    ) -> Result<Vec<T>, BackendError> {
        let request = self
            .request(Method::POST, &Query::table(table).path(), bearer)
            .header("Prefer", "return=representation")
            .json(body);
        self.send_json(request).await
    }

    /// Insert rows, merging into existing rows that collide on `on_conflict`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    pub async fn upsert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        on_conflict: &str,
        bearer: Bearer<'_>,
    ) -> Result<Vec<T>, BackendError> {
        let request = self
            .request(Method::POST, &Query::table(table).path(), bearer)
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(body);
        self.send_json(request).await
    }

    /// Patch every row matching `query`, returning the updated rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the update.
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        query: &Query,
        body: &B,
        bearer: Bearer<'_>,
    ) -> Result<Vec<T>, BackendError> {
        let request = self
            .request(Method::PATCH, &query.path(), bearer)
            .query(query.params())
            .header("Prefer", "return=representation")
            .json(body);
        self.send_json(request).await
    }

    /// Delete every row matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    pub async fn delete(&self, query: &Query, bearer: Bearer<'_>) -> Result<(), BackendError> {
        let request = self
            .request(Method::DELETE, &query.path(), bearer)
            .query(query.params());
        self.send_empty(request).await
    }

    /// Call a database function.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result does not decode.
    pub async fn rpc<A: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        function: &str,
        args: &A,
        bearer: Bearer<'_>,
    ) -> Result<T, BackendError> {
        let request = self
            .request(Method::POST, &format!("/rest/v1/rpc/{function}"), bearer)
            .json(args);
        self.send_json(request).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::backend::tests::client_for;

    #[test]
    fn test_query_params() {
        let q = Query::table("products")
            .select("*")
            .eq("is_approved", true)
            .in_list("id", &["a", "b"])
            .ilike("name", "raw* honey")
            .order("created_at", false)
            .limit(20)
            .offset(40);

        let params: Vec<(&str, &str)> = q
            .params()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            params,
            vec![
                ("select", "*"),
                ("is_approved", "eq.true"),
                ("id", "in.(a,b)"),
                ("name", "ilike.*raw honey*"),
                ("order", "created_at.desc"),
                ("limit", "20"),
                ("offset", "40"),
            ]
        );
    }

    #[tokio::test]
    async fn test_select_sends_filters_and_user_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/favorites")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "product_id".into()),
                Matcher::UrlEncoded("user_id".into(), "eq.u1".into()),
            ]))
            .match_header("authorization", "Bearer user-token")
            .with_status(200)
            .with_body(r#"[{"product_id":"p1"},{"product_id":"p2"}]"#)
            .create_async()
            .await;

        let rows: Vec<serde_json::Value> = client_for(&server)
            .select(
                &Query::table("favorites").select("product_id").eq("user_id", "u1"),
                Bearer::User("user-token"),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upsert_requests_merge() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/reviews")
            .match_query(Matcher::UrlEncoded("on_conflict".into(), "user_id,product_id".into()))
            .match_header("prefer", "resolution=merge-duplicates,return=representation")
            .match_body(Matcher::PartialJson(json!({"rating": 4})))
            .with_status(201)
            .with_body(r#"[{"rating":4}]"#)
            .create_async()
            .await;

        let rows: Vec<serde_json::Value> = client_for(&server)
            .upsert("reviews", &json!({"rating": 4}), "user_id,product_id", Bearer::User("t"))
            .await
            .unwrap();

        assert_eq!(rows[0]["rating"], 4);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rls_rejection_surfaces_as_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/products")
            .with_status(403)
            .with_body(r#"{"code":"42501","message":"new row violates row-level security policy"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .insert::<_, serde_json::Value>("products", &json!({}), Bearer::User("t"))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_rpc_decodes_scalar() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/rpc/check_delivery_eligibility")
            .match_body(Matcher::Json(json!({"pincode": "560001"})))
            .with_status(200)
            .with_body("true")
            .create_async()
            .await;

        let eligible: bool = client_for(&server)
            .rpc("check_delivery_eligibility", &json!({"pincode": "560001"}), Bearer::Anon)
            .await
            .unwrap();

        assert!(eligible);
    }
}
