//! Grow, shrink and boundary shifts of existing ranges
//!
//! A change is computed against the last accepted range, every newly
//! covered window is checked with the backend, and only then is the whole
//! result returned. A rejection always carries the range to keep, so the
//! count and the derived end address can never be reverted separately.

use std::sync::Arc;

use crate::address::Ipv4Address;
use crate::backend::{DdiBackend, RangeRecord, UsedAddressQuery};
use crate::error::{ArithmeticOp, RangeError, RangeField, RangeResult};
use crate::range::AddressRange;

/// Requested new values; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeChange {
    pub count: Option<u64>,
    pub start: Option<Ipv4Address>,
    pub end: Option<Ipv4Address>,
}

impl RangeChange {
    pub fn count(count: u64) -> Self {
        Self {
            count: Some(count),
            ..Self::default()
        }
    }

    pub fn start(start: Ipv4Address) -> Self {
        Self {
            start: Some(start),
            ..Self::default()
        }
    }

    pub fn end(end: Ipv4Address) -> Self {
        Self {
            end: Some(end),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count.is_none() && self.start.is_none() && self.end.is_none()
    }

    fn primary_field(&self) -> RangeField {
        if self.count.is_some() {
            RangeField::Count
        } else if self.start.is_some() {
            RangeField::Start
        } else {
            RangeField::End
        }
    }
}

/// A resize that was not applied
#[derive(Debug, thiserror::Error)]
#[error("{field} change rejected, keeping {retained}: {error}")]
pub struct ResizeRejection {
    pub field: RangeField,
    /// Last accepted range; the caller reverts to this
    pub retained: AddressRange,
    #[source]
    pub error: RangeError,
}

/// Result of a resize pushed to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeOutcome {
    pub range: AddressRange,
    /// `None` when the change left the range as it was
    pub record: Option<RangeRecord>,
}

pub struct RangeResizer {
    backend: Arc<dyn DdiBackend>,
}

impl RangeResizer {
    pub fn new(backend: Arc<dyn DdiBackend>) -> Self {
        Self { backend }
    }

    /// Compute the resized range, or the rejection with the range to keep
    pub async fn resize(
        &self,
        current: &AddressRange,
        change: &RangeChange,
    ) -> Result<AddressRange, ResizeRejection> {
        let reject = |field: RangeField, error: RangeError| {
            log::warn!("Rejected {} change on {}: {}", field, current, error);
            ResizeRejection {
                field,
                retained: current.clone(),
                error,
            }
        };

        if change.count.is_some() && change.end.is_some() {
            return Err(reject(
                RangeField::Count,
                RangeError::ConflictingChange(
                    "count and end_address cannot change together".to_string(),
                ),
            ));
        }
        current
            .validate()
            .map_err(|e| reject(change.primary_field(), e))?;

        let mut next = current.clone();

        if change.start.is_some() || change.end.is_some() {
            next = self
                .shift_bounds(&next, change.start, change.end)
                .await
                .map_err(|(field, e)| reject(field, e))?;
        }

        if let Some(count) = change.count {
            next = self
                .set_count(&next, count)
                .await
                .map_err(|e| reject(RangeField::Count, e))?;
        }

        if next != *current {
            log::info!("Resized range {} to {}", current, next);
        }
        Ok(next)
    }

    /// Resize and push the new bounds to the backend record
    pub async fn resize_and_update(
        &self,
        reference: &str,
        current: &AddressRange,
        change: &RangeChange,
    ) -> Result<ResizeOutcome, ResizeRejection> {
        let range = self.resize(current, change).await?;
        if range == *current {
            return Ok(ResizeOutcome {
                range,
                record: None,
            });
        }

        match self.backend.update_range(reference, &range).await {
            Ok(record) => {
                log::info!("Updated range record {} to {}", reference, range);
                Ok(ResizeOutcome {
                    range,
                    record: Some(record),
                })
            }
            Err(e) => Err(ResizeRejection {
                field: change.primary_field(),
                retained: current.clone(),
                error: e.into(),
            }),
        }
    }

    /// Move one or both bounds at once. Only the addresses the new bounds
    /// cover and the current range does not are checked with the backend.
    async fn shift_bounds(
        &self,
        current: &AddressRange,
        start: Option<Ipv4Address>,
        end: Option<Ipv4Address>,
    ) -> Result<AddressRange, (RangeField, RangeError)> {
        let moved = if start.is_some() {
            RangeField::Start
        } else {
            RangeField::End
        };
        let new_start = start.unwrap_or(current.start);
        let new_end = end.unwrap_or(current.end);

        current
            .cidr
            .check_contains(new_start)
            .map_err(|e| (RangeField::Start, e))?;
        current
            .cidr
            .check_contains(new_end)
            .map_err(|e| (RangeField::End, e))?;
        let next = AddressRange::new(current.cidr, new_start, new_end).map_err(|e| (moved, e))?;

        // Disjoint move: the whole new range is newly covered
        if new_start > current.end || new_end < current.start {
            let field = if new_start > current.end {
                RangeField::End
            } else {
                RangeField::Start
            };
            self.check_shift(current, field, new_start, new_end)
                .await
                .map_err(|e| (field, e))?;
            return Ok(next);
        }

        if new_start < current.start {
            let window_end = current
                .start
                .decrement()
                .map_err(|e| (RangeField::Start, e))?;
            self.check_shift(current, RangeField::Start, new_start, window_end)
                .await
                .map_err(|e| (RangeField::Start, e))?;
        }

        if new_end > current.end {
            let window_start = current
                .end
                .increment()
                .map_err(|e| (RangeField::End, e))?;
            self.check_shift(current, RangeField::End, window_start, new_end)
                .await
                .map_err(|e| (RangeField::End, e))?;
        }

        Ok(next)
    }

    async fn set_count(&self, current: &AddressRange, count: u64) -> RangeResult<AddressRange> {
        let old = current.count();

        if count < old {
            let delta = old - count;
            let end = current.end.subtract(delta)?;
            if end < current.start {
                return Err(RangeError::ArithmeticOverflow {
                    address: current.end,
                    op: ArithmeticOp::Subtract,
                    delta,
                });
            }
            return AddressRange::new(current.cidr, current.start, end);
        }

        if count > old {
            let delta = count - old;
            let end = current.end.add_within(delta, &current.cidr)?;
            let window_start = current.end.increment()?;
            let query = UsedAddressQuery::window(current.cidr, window_start, end);

            log::debug!(
                "Count {} -> {} on {}: checking {}-{}",
                old,
                count,
                current,
                window_start,
                end
            );
            let conflicts = self
                .backend
                .find_conflicts(&query)
                .await?
                .into_conflicts(&query)?;
            if !conflicts.is_empty() {
                return Err(RangeError::count_overlap(window_start, end, conflicts));
            }

            return AddressRange::new(current.cidr, current.start, end);
        }

        Ok(current.clone())
    }

    async fn check_shift(
        &self,
        current: &AddressRange,
        field: RangeField,
        start: Ipv4Address,
        end: Ipv4Address,
    ) -> RangeResult<()> {
        let query = UsedAddressQuery::window(current.cidr, start, end);
        log::debug!("{} shift on {}: checking {}-{}", field, current, start, end);

        let conflicts = self
            .backend
            .find_conflicts(&query)
            .await?
            .into_conflicts(&query)?;
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(RangeError::BoundaryShiftRejected {
                field,
                start,
                end,
                conflicts,
            })
        }
    }
}

/// A range together with its backend record, changed only by accepted resizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRange {
    reference: Option<String>,
    range: AddressRange,
}

impl ManagedRange {
    pub fn new(range: AddressRange) -> Self {
        Self {
            reference: None,
            range,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn range(&self) -> &AddressRange {
        &self.range
    }

    pub fn count(&self) -> u64 {
        self.range.count()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Apply a change; on rejection the held range is left untouched
    pub async fn apply(
        &mut self,
        resizer: &RangeResizer,
        change: &RangeChange,
    ) -> Result<&AddressRange, ResizeRejection> {
        let range = match self.reference.as_deref() {
            Some(reference) => {
                resizer
                    .resize_and_update(reference, &self.range, change)
                    .await?
                    .range
            }
            None => resizer.resize(&self.range, change).await?,
        };

        self.range = range;
        Ok(&self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        BackendType, CollaboratorError, Conflict, ConflictKind, MockDdiBackend, OverlapReport,
    };
    use crate::cidr::CidrBlock;

    fn ip(s: &str) -> Ipv4Address {
        s.parse().unwrap()
    }

    fn cidr() -> CidrBlock {
        "172.19.4.0/24".parse().unwrap()
    }

    fn range(start: &str, end: &str) -> AddressRange {
        AddressRange::new(cidr(), ip(start), ip(end)).unwrap()
    }

    fn mock_backend() -> MockDdiBackend {
        let mut backend = MockDdiBackend::new();
        backend.expect_name().return_const("mock".to_string());
        backend
            .expect_backend_type()
            .return_const(BackendType::Memory);
        backend
    }

    fn resizer(backend: MockDdiBackend) -> RangeResizer {
        RangeResizer::new(Arc::new(backend))
    }

    fn leased(addr: &str) -> OverlapReport {
        OverlapReport::Conflicts(vec![Conflict::address(
            addr.parse().unwrap(),
            ConflictKind::Lease,
        )])
    }

    #[tokio::test]
    async fn test_count_decrease_skips_overlap_check() {
        // No find_conflicts expectation: a call would panic
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.1", "172.19.4.10");

        let next = resizer.resize(&current, &RangeChange::count(8)).await.unwrap();
        assert_eq!(next.start, ip("172.19.4.1"));
        assert_eq!(next.end, ip("172.19.4.8"));
        assert_eq!(next.count(), 8);
    }

    #[tokio::test]
    async fn test_count_decrease_to_zero_underflows() {
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.1", "172.19.4.10");

        let rejection = resizer
            .resize(&current, &RangeChange::count(0))
            .await
            .unwrap_err();
        assert_eq!(rejection.field, RangeField::Count);
        assert_eq!(rejection.retained, current);
        assert!(matches!(
            rejection.error,
            RangeError::ArithmeticOverflow { .. }
        ));
    }

    #[tokio::test]
    async fn test_count_increase_checks_new_window() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .withf(|q| q.start == ip("172.19.4.11") && q.end == ip("172.19.4.12") && q.count == 2)
            .times(1)
            .returning(|_| Ok(OverlapReport::Clear));

        let current = range("172.19.4.1", "172.19.4.10");
        let next = resizer(backend)
            .resize(&current, &RangeChange::count(12))
            .await
            .unwrap();
        assert_eq!(next.end, ip("172.19.4.12"));
    }

    #[tokio::test]
    async fn test_count_increase_into_lease_is_rejected() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .times(1)
            .returning(|_| Ok(leased("172.19.4.11")));

        let current = range("172.19.4.1", "172.19.4.10");
        let rejection = resizer(backend)
            .resize(&current, &RangeChange::count(12))
            .await
            .unwrap_err();

        assert_eq!(rejection.field, RangeField::Count);
        assert_eq!(rejection.retained.count(), 10);
        assert_eq!(rejection.retained.end, ip("172.19.4.10"));
        match &rejection.error {
            RangeError::RangeOverlap { message, start, end, .. } => {
                assert_eq!(
                    message,
                    "count increase overlaps with another range or used address"
                );
                assert_eq!(*start, ip("172.19.4.11"));
                assert_eq!(*end, ip("172.19.4.12"));
            }
            other => panic!("expected overlap, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_count_increase_unconfirmed() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .returning(|_| Ok(OverlapReport::Unavailable("nil response".to_string())));

        let current = range("172.19.4.1", "172.19.4.10");
        let rejection = resizer(backend)
            .resize(&current, &RangeChange::count(11))
            .await
            .unwrap_err();
        assert!(matches!(
            rejection.error,
            RangeError::OverlapUnconfirmed { .. }
        ));
        assert_eq!(rejection.retained, current);
    }

    #[tokio::test]
    async fn test_count_increase_past_cidr() {
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.250", "172.19.4.254");

        let rejection = resizer
            .resize(&current, &RangeChange::count(10))
            .await
            .unwrap_err();
        assert!(matches!(
            rejection.error,
            RangeError::OutOfNetworkRange { .. }
        ));
    }

    #[tokio::test]
    async fn test_identical_resize_is_idempotent() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .times(2)
            .returning(|_| Ok(OverlapReport::Clear));

        let resizer = resizer(backend);
        let current = range("172.19.4.1", "172.19.4.10");
        let change = RangeChange::count(15);

        let first = resizer.resize(&current, &change).await.unwrap();
        let second = resizer.resize(&current, &change).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.end, ip("172.19.4.15"));
    }

    #[tokio::test]
    async fn test_start_decrease_checks_window() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .withf(|q| q.start == ip("172.19.4.5") && q.end == ip("172.19.4.9"))
            .times(1)
            .returning(|_| Ok(OverlapReport::Clear));

        let current = range("172.19.4.10", "172.19.4.20");
        let next = resizer(backend)
            .resize(&current, &RangeChange::start(ip("172.19.4.5")))
            .await
            .unwrap();
        assert_eq!(next.start, ip("172.19.4.5"));
        assert_eq!(next.end, ip("172.19.4.20"));
    }

    #[tokio::test]
    async fn test_start_decrease_into_range_is_rejected() {
        let mut backend = mock_backend();
        backend.expect_find_conflicts().returning(|_| {
            Ok(OverlapReport::Conflicts(vec![Conflict {
                start: "172.19.4.1".parse().unwrap(),
                end: "172.19.4.8".parse().unwrap(),
                kind: ConflictKind::Range,
                reference: Some("range/other".to_string()),
            }]))
        });

        let current = range("172.19.4.10", "172.19.4.20");
        let rejection = resizer(backend)
            .resize(&current, &RangeChange::start(ip("172.19.4.5")))
            .await
            .unwrap_err();

        assert_eq!(rejection.field, RangeField::Start);
        assert_eq!(rejection.retained.start, ip("172.19.4.10"));
        assert!(matches!(
            rejection.error,
            RangeError::BoundaryShiftRejected {
                field: RangeField::Start,
                ..
            }
        ));
        assert!(rejection
            .error
            .to_string()
            .starts_with("decreasing start_address overlaps with another range or used IP"));
    }

    #[tokio::test]
    async fn test_start_increase_needs_no_check() {
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.10", "172.19.4.20");

        let next = resizer
            .resize(&current, &RangeChange::start(ip("172.19.4.15")))
            .await
            .unwrap();
        assert_eq!(next.start, ip("172.19.4.15"));

        let rejection = resizer
            .resize(&current, &RangeChange::start(ip("172.19.4.21")))
            .await
            .unwrap_err();
        assert!(matches!(rejection.error, RangeError::InvalidRange { .. }));
        assert_eq!(rejection.retained, current);
    }

    #[tokio::test]
    async fn test_end_increase_into_lease_is_rejected() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .withf(|q| q.start == ip("172.19.4.21") && q.end == ip("172.19.4.30"))
            .returning(|_| Ok(leased("172.19.4.25")));

        let current = range("172.19.4.10", "172.19.4.20");
        let rejection = resizer(backend)
            .resize(&current, &RangeChange::end(ip("172.19.4.30")))
            .await
            .unwrap_err();

        assert_eq!(rejection.field, RangeField::End);
        assert_eq!(rejection.retained.end, ip("172.19.4.20"));
        assert!(rejection
            .error
            .to_string()
            .starts_with("increasing end_address overlaps with another range or used IP"));
    }

    #[tokio::test]
    async fn test_end_decrease_needs_no_check() {
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.10", "172.19.4.20");

        let next = resizer
            .resize(&current, &RangeChange::end(ip("172.19.4.12")))
            .await
            .unwrap();
        assert_eq!(next.count(), 3);

        let rejection = resizer
            .resize(&current, &RangeChange::end(ip("172.19.4.9")))
            .await
            .unwrap_err();
        assert!(matches!(rejection.error, RangeError::InvalidRange { .. }));
    }

    #[tokio::test]
    async fn test_shift_outside_cidr() {
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.10", "172.19.4.20");

        let rejection = resizer
            .resize(&current, &RangeChange::end(ip("172.19.5.5")))
            .await
            .unwrap_err();
        assert!(matches!(rejection.error, RangeError::OutsideCidr { .. }));
    }

    #[tokio::test]
    async fn test_count_and_end_together_are_rejected() {
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.10", "172.19.4.20");
        let change = RangeChange {
            count: Some(5),
            start: None,
            end: Some(ip("172.19.4.30")),
        };

        let rejection = resizer.resize(&current, &change).await.unwrap_err();
        assert!(matches!(
            rejection.error,
            RangeError::ConflictingChange(_)
        ));
    }

    #[tokio::test]
    async fn test_move_range_up_checks_only_new_range() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .withf(|q| q.start == ip("172.19.4.25") && q.end == ip("172.19.4.30") && q.count == 6)
            .times(1)
            .returning(|_| Ok(OverlapReport::Clear));

        let current = range("172.19.4.10", "172.19.4.20");
        let change = RangeChange {
            count: None,
            start: Some(ip("172.19.4.25")),
            end: Some(ip("172.19.4.30")),
        };
        let next = resizer(backend).resize(&current, &change).await.unwrap();
        assert_eq!(next, range("172.19.4.25", "172.19.4.30"));
    }

    #[tokio::test]
    async fn test_move_range_down_into_lease_is_rejected() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .withf(|q| q.start == ip("172.19.4.10") && q.end == ip("172.19.4.20"))
            .times(1)
            .returning(|_| Ok(leased("172.19.4.12")));

        let current = range("172.19.4.25", "172.19.4.30");
        let change = RangeChange {
            count: None,
            start: Some(ip("172.19.4.10")),
            end: Some(ip("172.19.4.20")),
        };
        let rejection = resizer(backend).resize(&current, &change).await.unwrap_err();

        assert_eq!(rejection.field, RangeField::Start);
        assert_eq!(rejection.retained, current);
        assert!(matches!(
            rejection.error,
            RangeError::BoundaryShiftRejected {
                field: RangeField::Start,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_overlapping_move_checks_uncovered_part() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .withf(|q| q.start == ip("172.19.4.21") && q.end == ip("172.19.4.25"))
            .times(1)
            .returning(|_| Ok(OverlapReport::Clear));

        let current = range("172.19.4.10", "172.19.4.20");
        let change = RangeChange {
            count: None,
            start: Some(ip("172.19.4.15")),
            end: Some(ip("172.19.4.25")),
        };
        let next = resizer(backend).resize(&current, &change).await.unwrap();
        assert_eq!(next, range("172.19.4.15", "172.19.4.25"));

        let inverted = RangeChange {
            count: None,
            start: Some(ip("172.19.4.30")),
            end: Some(ip("172.19.4.25")),
        };
        let rejection = resizer(mock_backend())
            .resize(&current, &inverted)
            .await
            .unwrap_err();
        assert!(matches!(rejection.error, RangeError::InvalidRange { .. }));
        assert_eq!(rejection.retained, current);
    }

    #[tokio::test]
    async fn test_start_and_count_apply_together() {
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.1", "172.19.4.10");
        let change = RangeChange {
            count: Some(8),
            start: Some(ip("172.19.4.3")),
            end: None,
        };

        let next = resizer.resize(&current, &change).await.unwrap();
        assert_eq!(next, range("172.19.4.3", "172.19.4.10"));
    }

    #[tokio::test]
    async fn test_resize_and_update_failure_keeps_previous_range() {
        let mut backend = mock_backend();
        backend.expect_update_range().times(1).returning(|_, _| {
            Err(CollaboratorError::Api {
                message: "503 Service Unavailable".to_string(),
            })
        });

        let current = range("172.19.4.1", "172.19.4.10");
        let rejection = resizer(backend)
            .resize_and_update("range/abc", &current, &RangeChange::count(5))
            .await
            .unwrap_err();
        assert_eq!(rejection.retained, current);
        assert!(rejection.error.is_collaborator());
    }

    #[tokio::test]
    async fn test_resize_and_update_unchanged_skips_backend() {
        let resizer = resizer(mock_backend());
        let current = range("172.19.4.1", "172.19.4.10");

        let outcome = resizer
            .resize_and_update("range/abc", &current, &RangeChange::count(10))
            .await
            .unwrap();
        assert_eq!(outcome.range, current);
        assert!(outcome.record.is_none());
    }

    #[tokio::test]
    async fn test_managed_range_only_changes_on_success() {
        let mut backend = mock_backend();
        backend
            .expect_find_conflicts()
            .returning(|_| Ok(leased("172.19.4.11")));

        let resizer = resizer(backend);
        let mut managed = ManagedRange::new(range("172.19.4.1", "172.19.4.10"));

        assert!(managed.apply(&resizer, &RangeChange::count(12)).await.is_err());
        assert_eq!(managed.count(), 10);
        assert_eq!(managed.range().end, ip("172.19.4.10"));

        let shrunk = managed
            .apply(&resizer, &RangeChange::count(8))
            .await
            .unwrap()
            .clone();
        assert_eq!(shrunk.end, ip("172.19.4.8"));
        assert_eq!(managed.count(), 8);
    }
}
