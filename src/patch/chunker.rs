//! Binary-delta chunker (spec §4.4): turns a byte-for-byte comparison of
//! two equal-length-prefix buffers into a minimal set of overwrite runs.

/// Merge two runs whose gap is at most this many bytes — closer runs are
/// cheaper to coalesce into one `BINDIFF` record than to encode
/// separately.
const MERGE_GAP: usize = 64;
/// No single `BINDIFF` run may exceed this many bytes.
const MAX_RUN_LEN: usize = 1024;
/// Below this size, a `MODIFY` of the whole file is used instead of
/// chunking at all.
pub const MODIFY_THRESHOLD: usize = 1024;

/// One contiguous overwrite run: `[offset, offset + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub offset: usize,
    pub len: usize,
}

/// Compute the overwrite runs needed to turn `previous` into `current`
/// over their shared length prefix `[0, min(len(previous), len(current)))`.
///
/// Callers are responsible for falling back to `MODIFY` when the two
/// buffers differ in length (spec §4.4 step 5, open question 1) or when
/// the resulting runs would not save space versus re-sending the whole
/// file (checked by [`crate::patch::synth::synthesize_change_set`]).
#[must_use]
pub fn diff_chunks(previous: &[u8], current: &[u8]) -> Vec<Run> {
    let shared_len = previous.len().min(current.len());

    let diff_positions: Vec<usize> = (0..shared_len)
        .filter(|&i| previous[i] != current[i])
        .collect();

    if diff_positions.is_empty() {
        return Vec::new();
    }

    let merged = merge_close_positions(&diff_positions);
    split_oversized(&merged)
}

/// Group consecutive differing byte positions into runs, merging any two
/// runs whose gap is `<= MERGE_GAP`.
fn merge_close_positions(positions: &[usize]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    let mut start = positions[0];
    let mut end = positions[0] + 1; // exclusive end

    for &pos in &positions[1..] {
        if pos <= end + MERGE_GAP {
            end = pos + 1;
        } else {
            runs.push(Run {
                offset: start,
                len: end - start,
            });
            start = pos;
            end = pos + 1;
        }
    }
    runs.push(Run {
        offset: start,
        len: end - start,
    });
    runs
}

/// Split any run exceeding `MAX_RUN_LEN` into sub-runs of at most
/// `MAX_RUN_LEN` bytes each.
fn split_oversized(runs: &[Run]) -> Vec<Run> {
    let mut out = Vec::with_capacity(runs.len());
    for run in runs {
        let mut offset = run.offset;
        let mut remaining = run.len;
        while remaining > 0 {
            let len = remaining.min(MAX_RUN_LEN);
            out.push(Run { offset, len });
            offset += len;
            remaining -= len;
        }
    }
    out
}

/// Total byte cost of encoding `runs` as `BINDIFF` records, used by the
/// synthesis layer to decide whether chunking undercuts a plain
/// `MODIFY`.
#[must_use]
pub fn total_payload_bytes(runs: &[Run]) -> usize {
    runs.iter().map(|r| r.len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_buffers_produce_no_runs() {
        assert!(diff_chunks(b"abcdef", b"abcdef").is_empty());
    }

    #[test]
    fn single_byte_change_is_one_run() {
        let prev = b"hello world";
        let mut cur = prev.to_vec();
        cur[0] = b'H';
        let runs = diff_chunks(prev, &cur);
        assert_eq!(runs, vec![Run { offset: 0, len: 1 }]);
    }

    #[test]
    fn close_runs_are_merged() {
        let prev = vec![0u8; 200];
        let mut cur = prev.clone();
        cur[10] = 1;
        cur[50] = 1; // gap of 39 bytes from the end of the first 1-byte run
        let runs = diff_chunks(&prev, &cur);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].offset, 10);
        assert_eq!(runs[0].len, 41);
    }

    #[test]
    fn distant_runs_stay_separate() {
        let prev = vec![0u8; 300];
        let mut cur = prev.clone();
        cur[0] = 1;
        cur[200] = 1; // gap of 199 bytes, far beyond MERGE_GAP
        let runs = diff_chunks(&prev, &cur);
        assert_eq!(runs.len(), 2);
    }

    #[test]
    fn oversized_run_is_split() {
        let prev = vec![0u8; 3000];
        let mut cur = prev.clone();
        for b in cur.iter_mut().take(2500) {
            *b = 1;
        }
        let runs = diff_chunks(&prev, &cur);
        assert!(runs.iter().all(|r| r.len <= MAX_RUN_LEN));
        assert_eq!(total_payload_bytes(&runs), 2500);
    }

    #[test]
    fn runs_never_exceed_max_len_property() {
        // A single long run should always decompose into <= MAX_RUN_LEN pieces.
        let len = 10_000;
        let prev = vec![0u8; len];
        let cur = vec![1u8; len];
        let runs = diff_chunks(&prev, &cur);
        assert!(runs.iter().all(|r| r.len > 0 && r.len <= MAX_RUN_LEN));
        assert_eq!(total_payload_bytes(&runs), len);
    }

    proptest::proptest! {
        #[test]
        fn runs_always_respect_max_len(
            prev in proptest::collection::vec(proptest::num::u8::ANY, 0..2000),
            flips in proptest::collection::vec(0usize..2000, 0..50),
        ) {
            let mut cur = prev.clone();
            for &i in &flips {
                if i < cur.len() {
                    cur[i] = cur[i].wrapping_add(1);
                }
            }
            let runs = diff_chunks(&prev, &cur);
            proptest::prop_assert!(runs.iter().all(|r| r.len <= MAX_RUN_LEN && r.len > 0));
        }

        #[test]
        fn runs_never_overlap_and_stay_in_bounds(
            prev in proptest::collection::vec(proptest::num::u8::ANY, 0..2000),
            flips in proptest::collection::vec(0usize..2000, 0..50),
        ) {
            let mut cur = prev.clone();
            for &i in &flips {
                if i < cur.len() {
                    cur[i] = cur[i].wrapping_add(1);
                }
            }
            let runs = diff_chunks(&prev, &cur);
            let mut prev_end = 0usize;
            for run in &runs {
                proptest::prop_assert!(run.offset >= prev_end);
                proptest::prop_assert!(run.offset + run.len <= prev.len().min(cur.len()));
                prev_end = run.offset + run.len;
            }
        }

        #[test]
        fn total_payload_never_exceeds_shared_length(
            prev in proptest::collection::vec(proptest::num::u8::ANY, 0..2000),
            flips in proptest::collection::vec(0usize..2000, 0..50),
        ) {
            let mut cur = prev.clone();
            for &i in &flips {
                if i < cur.len() {
                    cur[i] = cur[i].wrapping_add(1);
                }
            }
            let runs = diff_chunks(&prev, &cur);
            proptest::prop_assert!(total_payload_bytes(&runs) <= prev.len().min(cur.len()));
        }
    }
}
