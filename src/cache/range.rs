//! Superset/subset matching between paginated queries.
//!
//! A cached page realizes the range `[offset, offset + records)`. A narrower
//! request with the same filters can be answered from it when its requested
//! range `[offset, offset + limit)` lies entirely inside.

use super::key::ListQuery;
use super::traits::ListPage;

/// True if both queries resolve every filter field to the same value.
pub fn filters_equal(a: &ListQuery, b: &ListQuery) -> bool {
  a.filters()
    .keys()
    .chain(b.filters().keys())
    .all(|name| a.filter_value(name) == b.filter_value(name))
}

/// Whether a superset holding `superset_count` records can answer `target`.
pub fn can_cover(superset: &ListQuery, superset_count: usize, target: &ListQuery) -> bool {
  if !filters_equal(superset, target) {
    return false;
  }

  let superset_start = superset.offset();
  let superset_end = superset_start + superset_count as u64;
  let target_start = target.offset();
  let target_end = target_start + u64::from(target.limit());

  target_start >= superset_start && target_end <= superset_end
}

/// Cut the records `target` asks for out of a superset page.
///
/// Returns `None` if the target starts before the superset or past its last
/// record. Coverage is checked separately by [`can_cover`].
pub fn derive_slice<T: Clone>(
  superset: &ListPage<T>,
  superset_query: &ListQuery,
  target: &ListQuery,
) -> Option<ListPage<T>> {
  if superset.is_empty() {
    return None;
  }

  let offset = target.offset().checked_sub(superset_query.offset())?;
  let offset = usize::try_from(offset).ok()?;
  if offset >= superset.len() {
    return None;
  }

  let end = offset
    .saturating_add(target.limit() as usize)
    .min(superset.len());

  Some(ListPage::new(
    superset.records[offset..end].to_vec(),
    superset.total_count,
    target.page(),
    target.limit(),
  ))
}
