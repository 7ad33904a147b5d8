//! Per-cell time since a fire was last detected.
//!
//! The scan over cycles keeps, for every cell, the most recent cycle with
//! FRP > 0. Comparing that with the reference cycle gives a [`FireAge`].
use error_stack::ResultExt;
use ndarray::{Array2, ArrayView2, Zip};

use crate::{
    cycle::Cycle,
    grid::GridShape,
    raster::{CycleRaster, RasterSource},
};

#[derive(Debug, thiserror::Error)]
pub enum FireAgeError {
    #[error("An error occurred while {0}")]
    Context(String),
}

impl FireAgeError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}

/// How long ago a cell last had a detected fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireAge {
    /// No detection in any scanned cycle.
    NeverObserved,
    /// Last detection at (or after) the reference cycle.
    ObservedNow,
    /// Last detection this many whole hours before the reference cycle.
    HoursAgo(u32),
}

impl FireAge {
    /// Value written to the `fire_end_hr` output variable. Both
    /// `NeverObserved` and `ObservedNow` are 0 there.
    pub fn end_hours(&self) -> f64 {
        match self {
            FireAge::NeverObserved | FireAge::ObservedNow => 0.0,
            FireAge::HoursAgo(h) => f64::from(*h),
        }
    }

    fn from_elapsed(hours: i64) -> Self {
        if hours <= 0 {
            FireAge::ObservedNow
        } else {
            FireAge::HoursAgo(u32::try_from(hours).unwrap_or(u32::MAX))
        }
    }
}

/// Most recent detection per cell; `None` until a fire is seen.
#[derive(Debug, Clone)]
pub struct LastSeen(Array2<Option<Cycle>>);

impl LastSeen {
    pub fn new(shape: GridShape) -> Self {
        Self(Array2::from_elem(shape.dims(), None))
    }

    /// Fold in one cycle's FRP: cells burning in `cycle` move their last
    /// detection forward to it, unless they already saw a later one.
    pub fn add(mut self, cycle: Cycle, frp: ArrayView2<f64>) -> Self {
        Zip::from(&mut self.0).and(&frp).for_each(|last, &v| {
            if v > 0.0 {
                *last = (*last).max(Some(cycle));
            }
        });
        self
    }

    pub fn add_raster(self, raster: &CycleRaster) -> Self {
        self.add(raster.cycle, raster.frp.view())
    }

    /// Classify every cell relative to `reference`.
    pub fn ages(&self, reference: Cycle) -> Array2<FireAge> {
        self.0.mapv(|last| match last {
            None => FireAge::NeverObserved,
            Some(c) => FireAge::from_elapsed(reference.hours_since(&c)),
        })
    }

    pub fn view(&self) -> ArrayView2<Option<Cycle>> {
        self.0.view()
    }
}

/// Result of the fire-age estimate.
#[derive(Debug, Clone)]
pub enum FireAgeField {
    Estimated(Array2<FireAge>),
    /// The reference timestamp could not be interpreted; every cell reports 0.
    Degraded(GridShape),
}

impl FireAgeField {
    /// Finish a scan against the reference timestamp string. A malformed
    /// reference degrades the whole field rather than single cells.
    pub fn from_last_seen(last_seen: &LastSeen, reference: &str, shape: GridShape) -> Self {
        match reference.parse::<Cycle>() {
            Ok(reference) => Self::Estimated(last_seen.ages(reference)),
            Err(e) => {
                log::warn!("Cannot compute fire age, all cells set to 0: {e}");
                Self::Degraded(shape)
            }
        }
    }

    /// The `fire_end_hr` raster (hours since last detection, 0 if none).
    pub fn end_hours(&self) -> Array2<f64> {
        match self {
            FireAgeField::Estimated(ages) => ages.mapv(|a| a.end_hours()),
            FireAgeField::Degraded(shape) => shape.zeros(),
        }
    }
}

/// Estimate per-cell hours since the last detected fire over `cycles`,
/// relative to `reference` (`YYYYMMDDHH`). Cycles without a raster file
/// are skipped.
pub fn estimate_fire_age(
    cycles: &[Cycle],
    source: &RasterSource,
    reference: &str,
    shape: GridShape,
) -> error_stack::Result<FireAgeField, FireAgeError> {
    let (last_seen, _) = source
        .fold_rasters(cycles, shape, LastSeen::new(shape), LastSeen::add_raster)
        .change_context_lazy(|| FireAgeError::context("scanning rasters for fire detections"))?;
    Ok(FireAgeField::from_last_seen(&last_seen, reference, shape))
}
