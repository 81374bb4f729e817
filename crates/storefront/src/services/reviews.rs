//! Product reviews.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;
use verdant_core::{ProductId, UserId};

use super::ServiceError;
use crate::backend::{BackendClient, Bearer, NewReview, Review};

/// Longest accepted review comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 1000;

/// Aggregate of a product's ratings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingSummary {
    /// Mean rating rounded to one decimal, 0 when unrated.
    pub average: f64,
    pub count: usize,
    /// Count of 1-star through 5-star reviews.
    pub histogram: [usize; 5],
}

impl RatingSummary {
    #[must_use]
    pub fn from_ratings(ratings: impl IntoIterator<Item = u8>) -> Self {
        let mut histogram = [0usize; 5];
        let mut count = 0usize;
        let mut sum = 0u64;
        for rating in ratings {
            if let Some(slot) = usize::from(rating)
                .checked_sub(1)
                .and_then(|i| histogram.get_mut(i))
            {
                *slot += 1;
                count += 1;
                sum += u64::from(rating);
            }
        }

        #[allow(clippy::cast_precision_loss)] // review counts stay far below 2^52
        let average = if count == 0 {
            0.0
        } else {
            ((sum as f64 / count as f64) * 10.0).round() / 10.0
        };

        Self {
            average,
            count,
            histogram,
        }
    }
}

/// A review as shown on the product page.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    pub user_id: UserId,
    pub reviewer_name: String,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Review> for ReviewView {
    fn from(review: Review) -> Self {
        Self {
            user_id: review.user_id,
            reviewer_name: review
                .profile
                .and_then(|p| p.full_name)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Verified buyer".to_owned()),
            rating: review.rating,
            comment: review.comment,
            created_at: review.created_at,
        }
    }
}

/// Check a rating and normalize a comment (trimmed, blank becomes `None`).
///
/// # Errors
///
/// Returns `Validation` for ratings outside 1..=5 or over-long comments.
pub fn validate_review(rating: u8, comment: Option<&str>) -> Result<Option<String>, ServiceError> {
    if !(1..=5).contains(&rating) {
        return Err(ServiceError::validation("rating must be between 1 and 5"));
    }
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    if let Some(c) = comment
        && c.chars().count() > MAX_COMMENT_CHARS
    {
        return Err(ServiceError::validation(format!(
            "comment must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(comment.map(str::to_owned))
}

/// Review operations for one signed-in user.
pub struct ReviewService<'a> {
    backend: &'a BackendClient,
    user: UserId,
    access_token: &'a str,
}

impl<'a> ReviewService<'a> {
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

    /// Create or replace the user's review of a product.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for bad input, `NotFound` for unknown products.
    #[instrument(skip(self, comment), fields(user_id = %self.user))]
    pub async fn submit(
        &self,
        product: ProductId,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<ReviewView, ServiceError> {
        let comment = validate_review(rating, comment)?;
        if self.backend.get_product(product, self.bearer()).await?.is_none() {
            return Err(ServiceError::NotFound("product"));
        }
        let review = NewReview {
            user_id: self.user,
            product_id: product,
            rating,
            comment,
        };
        let stored = self.backend.upsert_review(&review, self.bearer()).await?;
        Ok(stored.into())
    }

    /// Remove the user's review of a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    #[instrument(skip(self), fields(user_id = %self.user))]
    pub async fn remove(&self, product: ProductId) -> Result<(), ServiceError> {
        self.backend
            .delete_review(self.user, product, self.bearer())
            .await?;
        Ok(())
    }
}

/// A product's reviews and their summary.
///
/// # Errors
///
/// Returns an error if the backend request fails.
pub async fn product_reviews(
    backend: &BackendClient,
    product: ProductId,
    bearer: Bearer<'_>,
) -> Result<(RatingSummary, Vec<ReviewView>), ServiceError> {
    let reviews = backend.product_reviews(product, bearer).await?;
    let summary = RatingSummary::from_ratings(reviews.iter().map(|r| r.rating));
    Ok((summary, reviews.into_iter().map(ReviewView::from).collect()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_summary() {
        let summary = RatingSummary::from_ratings([5, 4, 4, 1]);
        assert_eq!(summary.count, 4);
        assert!((summary.average - 3.5).abs() < f64::EPSILON);
        assert_eq!(summary.histogram, [1, 0, 0, 2, 1]);
    }

    #[test]
    fn test_rating_summary_rounds_and_ignores_out_of_range() {
        let summary = RatingSummary::from_ratings([5, 4, 4, 0, 9]);
        assert_eq!(summary.count, 3);
        assert!((summary.average - 4.3).abs() < 1e-9);
        let empty = RatingSummary::from_ratings(std::iter::empty());
        assert_eq!(empty.count, 0);
        assert!(empty.average.abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_review() {
        assert!(validate_review(0, None).is_err());
        assert!(validate_review(6, None).is_err());
        assert_eq!(validate_review(5, Some("   ")).unwrap(), None);
        assert_eq!(validate_review(3, Some(" ok ")).unwrap().as_deref(), Some("ok"));

        let long = "a".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            validate_review(4, Some(&long)),
            Err(ServiceError::Validation(_))
        ));
        let exact = "é".repeat(MAX_COMMENT_CHARS);
        assert!(validate_review(4, Some(&exact)).is_ok());
    }

    #[test]
    fn test_review_view_defaults_reviewer_name() {
        let review: Review = serde_json::from_value(serde_json::json!({
            "id": verdant_core::ReviewId::random(),
            "user_id": UserId::random(),
            "product_id": ProductId::random(),
            "rating": 5,
            "profile": {"full_name": null},
        }))
        .unwrap();
        assert_eq!(ReviewView::from(review).reviewer_name, "Verified buyer");
    }
}
