//! Run independent datasets concurrently.
//!
//! Each worker thread owns its own filter instance; nothing is shared between
//! datasets, so one failing dataset does not disturb the others.

use crossbeam::thread;

use crate::dataset::{OrientationDataset, VelocityDataset};
use crate::error::{FusionError, FusionResult};
use crate::filters::orientation::{OrientationFilter, OrientationSeries};
use crate::filters::velocity::{SpeedSeries, VelocityFilter};

/// A filter that can post-process a complete dataset.
pub trait BatchEstimator {
    type Dataset: Sync;
    type Output: Send;

    fn analyze_dataset(&mut self, dataset: &Self::Dataset) -> FusionResult<Self::Output>;
}

impl BatchEstimator for OrientationFilter {
    type Dataset = OrientationDataset;
    type Output = OrientationSeries;

    fn analyze_dataset(&mut self, dataset: &OrientationDataset) -> FusionResult<OrientationSeries> {
        OrientationFilter::analyze_dataset(self, dataset)
    }
}

impl BatchEstimator for VelocityFilter {
    type Dataset = VelocityDataset;
    type Output = SpeedSeries;

    fn analyze_dataset(&mut self, dataset: &VelocityDataset) -> FusionResult<SpeedSeries> {
        VelocityFilter::analyze_dataset(self, dataset)
    }
}

/// Analyze every dataset on up to `workers` threads. Results keep input order.
///
/// `make_filter` builds a fresh instance per dataset.
pub fn analyze_parallel<E, F>(
    datasets: &[E::Dataset],
    workers: usize,
    make_filter: F,
) -> Vec<FusionResult<E::Output>>
where
    E: BatchEstimator,
    F: Fn() -> E + Sync,
{
    if datasets.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, datasets.len());
    let chunk = datasets.len().div_ceil(workers);
    log::debug!(
        "Analyzing {} datasets on {} workers",
        datasets.len(),
        workers
    );

    let make_filter = &make_filter;
    let joined = thread::scope(|scope| {
        let handles: Vec<_> = datasets
            .chunks(chunk)
            .map(|group| {
                scope.spawn(move |_| {
                    group
                        .iter()
                        .map(|dataset| make_filter().analyze_dataset(dataset))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    });

    match joined {
        Ok(groups) => groups
            .into_iter()
            .zip(datasets.chunks(chunk))
            .flat_map(|(group, inputs)| match group {
                Ok(results) => results,
                Err(_) => {
                    log::warn!("Batch worker panicked; marking {} datasets failed", inputs.len());
                    inputs
                        .iter()
                        .map(|_| Err(FusionError::numerical("batch worker panicked")))
                        .collect()
                }
            })
            .collect(),
        Err(_) => datasets
            .iter()
            .map(|_| Err(FusionError::numerical("batch scope panicked")))
            .collect(),
    }
}
