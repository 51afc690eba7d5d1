//! Test assertions for pool outputs.

use crate::errors::JobError;
use std::fmt::Debug;

/// Asserts that `actual` holds exactly the items of `expected`, in any order.
pub fn assert_exactly_once<T>(expected: &[T], actual: &[T])
where
    T: Ord + Clone + Debug,
{
    let mut expected = expected.to_vec();
    let mut actual = actual.to_vec();
    expected.sort();
    actual.sort();
    assert_eq!(
        actual, expected,
        "Expected every item exactly once (sorted actual vs expected)"
    );
}

/// Asserts that every submitted job came back either as a result or as a
/// failure in `errors`, and nothing else did.
///
/// Meant for pools whose result is the job itself.
pub fn assert_jobs_accounted_for<J>(submitted: &[J], results: &[J], errors: &[JobError])
where
    J: Ord + Clone + Debug + 'static,
{
    let mut seen = results.to_vec();
    for error in errors {
        match error.job::<J>() {
            Some(job) => seen.push(job.clone()),
            None => panic!("Failure from stage {} holds a job of another type", error.stage),
        }
    }
    assert_exactly_once(submitted, &seen);
}
