use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{ClaimsError, ClaimsResult};
use crate::models::{Batch, BatchDetail, BatchStatus, BatchType, NewBatch};
use crate::numbering::NumberScope;
use crate::repository::{BatchSelection, ClaimsRepository};

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// First day of the selection window ending on `date`; windows close at the end of `date`
pub fn window_start(batch_type: BatchType, date: NaiveDate) -> NaiveDate {
    match batch_type {
        BatchType::Weekly => date - Duration::days(6),
        BatchType::Monthly => date.with_day(1).unwrap_or(date),
        BatchType::Custom => date,
    }
}

/// Creation-time window `[start, end)` for auto-selected claims
pub fn selection_window(
    batch_type: BatchType,
    batch_date: NaiveDate,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> ClaimsResult<(DateTime<Utc>, DateTime<Utc>)> {
    let first = start_date.unwrap_or_else(|| window_start(batch_type, batch_date));
    let last = end_date.unwrap_or(batch_date);
    if first > last {
        return Err(ClaimsError::Validation(format!(
            "Batch window start {first} is after end {last}"
        )));
    }
    Ok((start_of_day(first), start_of_day(last + Duration::days(1))))
}

/// Batch Manager: groups ready claims for one bulk submission
#[derive(Clone)]
pub struct BatchManager {
    repo: Arc<dyn ClaimsRepository>,
}

impl BatchManager {
    pub fn new(repo: Arc<dyn ClaimsRepository>) -> Self {
        Self { repo }
    }

    /// Create a draft batch from explicit claim ids or the window implied by
    /// the batch type. Only `ready_to_submit` claims without a batch are taken.
    pub async fn create_batch(&self, request: NewBatch, created_by: Uuid) -> ClaimsResult<Batch> {
        let now = Utc::now();
        let batch_date = request.batch_date.unwrap_or_else(|| now.date_naive());

        let selection = if request.claim_ids.is_empty() {
            let (start, end) = selection_window(
                request.batch_type,
                batch_date,
                request.start_date,
                request.end_date,
            )?;
            BatchSelection::Window { start, end }
        } else {
            BatchSelection::Claims(request.claim_ids)
        };

        let scope = NumberScope::Batch;
        let period = scope.period(batch_date);
        let seq = self.repo.next_sequence(scope, &period).await?;

        let draft = Batch {
            id: Uuid::new_v4(),
            batch_number: scope.format(&period, seq),
            batch_date,
            batch_type: request.batch_type,
            total_claims: 0,
            total_amount: Decimal::ZERO,
            status: BatchStatus::Draft,
            sha_batch_reference: None,
            submitted_by: None,
            submitted_at: None,
            created_by,
            created_at: now,
            updated_at: now,
        };

        let batch = self.repo.create_batch(&draft, &selection).await?;
        tracing::info!(
            batch_id = %batch.id,
            batch_number = %batch.batch_number,
            batch_type = %batch.batch_type,
            total_claims = batch.total_claims,
            total_amount = %batch.total_amount,
            "Claim batch created"
        );
        Ok(batch)
    }

    /// Release the members of a draft batch and remove it
    pub async fn delete_batch(&self, batch_id: Uuid, deleted_by: Uuid) -> ClaimsResult<Vec<Uuid>> {
        let released = self.repo.delete_batch(batch_id, deleted_by).await?;
        tracing::info!(
            batch_id = %batch_id,
            released = released.len(),
            "Claim batch deleted"
        );
        Ok(released)
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> ClaimsResult<BatchDetail> {
        let batch = self
            .repo
            .find_batch(batch_id)
            .await?
            .ok_or_else(|| ClaimsError::not_found("Batch", batch_id))?;
        let claims = self.repo.batch_claims(batch_id).await?;
        Ok(BatchDetail { batch, claims })
    }

    pub async fn list_batches(&self, status: Option<BatchStatus>) -> ClaimsResult<Vec<Batch>> {
        self.repo.list_batches(status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekly_window_covers_seven_days() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let (start, end) = selection_window(BatchType::Weekly, date, None, None).unwrap();
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 8).unwrap());
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    }

    #[test]
    fn test_monthly_window_starts_on_first() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 20).unwrap();
        let (start, _) = selection_window(BatchType::Monthly, date, None, None).unwrap();
        assert_eq!(start.date_naive(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn test_custom_window_is_the_batch_day() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let (start, end) = selection_window(BatchType::Custom, date, None, None).unwrap();
        assert_eq!(start, start_of_day(date));
        assert_eq!(end - start, Duration::hours(24));
    }

    #[test]
    fn test_explicit_range_must_be_ordered() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let later = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        let result = selection_window(BatchType::Custom, date, Some(later), Some(date));
        assert!(matches!(result, Err(ClaimsError::Validation(_))));
    }
}
