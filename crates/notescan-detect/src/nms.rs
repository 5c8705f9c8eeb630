//! Per-class greedy non-max suppression.

use crate::decode::Candidate;

/// Remove overlapping lower-confidence duplicates, per class independently.
///
/// Candidates are partitioned by class; within a class they are taken in
/// descending confidence (ties keep decode order – the sort is stable), the
/// best is kept and every remaining box with IoU `>=` the threshold against
/// it is dropped.  A box of one class never suppresses a box of another.
/// Output order is ascending class id, then per-class keep order –
/// deterministic for identical input.
///
/// The per-class scan is O(n²); post-threshold candidate counts are tens
/// per frame, not thousands.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    if candidates.is_empty() {
        return candidates;
    }

    // Stable sort groups the classes and orders each partition by
    // confidence, preserving decode order among equal scores.
    candidates.sort_by(|a, b| {
        a.class_id
            .cmp(&b.class_id)
            .then(b.confidence.total_cmp(&a.confidence))
    });

    let mut keep = Vec::with_capacity(candidates.len());
    let mut start = 0;
    while start < candidates.len() {
        let class_id = candidates[start].class_id;
        let mut end = start + 1;
        while end < candidates.len() && candidates[end].class_id == class_id {
            end += 1;
        }

        let partition = &candidates[start..end];
        let mut suppressed = vec![false; partition.len()];
        for i in 0..partition.len() {
            if suppressed[i] {
                continue;
            }
            keep.push(partition[i].clone());
            for j in (i + 1)..partition.len() {
                if !suppressed[j]
                    && partition[i].rect.iou(&partition[j].rect) >= iou_threshold
                {
                    suppressed[j] = true;
                }
            }
        }
        start = end;
    }
    keep
}
