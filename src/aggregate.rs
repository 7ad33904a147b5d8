//! Aggregation of per-cycle fields into daily fields.
//!
//! Two missing-data policies live here and are deliberately kept apart:
//!
//! - **skip** ([`hwp_skip_step`]): a cycle without data contributes nothing
//!   at all to the HWP mean. If no cycle contributes, the mean is all zeros.
//! - **mask-to-nan-then-floor** ([`FrpEbbAccumulator::add`]): inside a cycle
//!   that does have a raster, cells without a detected fire are masked to
//!   NaN for the FRP mean (so they do not drag it toward zero) and add
//!   exactly zero to the emission total. The final FRP mean is floored at
//!   zero, which also turns "never burning" cells from NaN into 0.
use std::path::Path;

use error_stack::ResultExt;
use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use crate::{
    cycle::Cycle,
    grid::{GridShape, StaticGrid},
    naming,
    nc_utils::read_grid_field,
    raster::{CycleRaster, RasterSource},
};

pub const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("An error occurred while {0}")]
    Context(String),
}

impl AggregateError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}

/// Constants converting fire radiative energy into an emission mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionConstants {
    /// Burn efficiency factor
    pub beta: f64,
    /// Gram to microgram conversion
    pub unit_scale: f64,
}

impl Default for EmissionConstants {
    fn default() -> Self {
        Self {
            beta: 0.3,
            unit_scale: 1.0e6,
        }
    }
}

/// Running per-cell mean that ignores NaN samples.
#[derive(Debug, Clone)]
pub struct NanMeanAccumulator {
    sum: Array2<f64>,
    count: Array2<u32>,
    nsamples: usize,
}

impl NanMeanAccumulator {
    pub fn new(shape: GridShape) -> Self {
        Self {
            sum: shape.zeros(),
            count: Array2::zeros(shape.dims()),
            nsamples: 0,
        }
    }

    /// Fold one sample in.
    pub fn add(mut self, sample: ArrayView2<f64>) -> Self {
        Zip::from(&mut self.sum)
            .and(&mut self.count)
            .and(&sample)
            .for_each(|s, n, &v| {
                if !v.is_nan() {
                    *s += v;
                    *n += 1;
                }
            });
        self.nsamples += 1;
        self
    }

    /// Number of samples folded in, including all-NaN ones.
    pub fn nsamples(&self) -> usize {
        self.nsamples
    }

    /// Per-cell mean; NaN where every sample was NaN.
    pub fn mean(&self) -> Array2<f64> {
        Zip::from(&self.sum)
            .and(&self.count)
            .map_collect(|&s, &n| if n == 0 { f64::NAN } else { s / f64::from(n) })
    }
}

/// The skip policy: an absent sample leaves the accumulator untouched.
pub fn hwp_skip_step(acc: NanMeanAccumulator, sample: Option<Array2<f64>>) -> NanMeanAccumulator {
    match sample {
        Some(field) => acc.add(field.view()),
        None => acc,
    }
}

/// Final HWP mean: all zeros when nothing contributed.
pub fn finish_hwp(acc: &NanMeanAccumulator, shape: GridShape) -> Array2<f64> {
    if acc.nsamples() == 0 {
        shape.zeros()
    } else {
        acc.mean()
    }
}

/// Mean hourly wildfire potential over `cycles`.
///
/// A cycle contributes only when both its restart snapshot in `hourly_dir`
/// and its interpolated raster file exist.
pub fn hwp_daily_mean(
    cycles: &[Cycle],
    hourly_dir: &Path,
    raster: &RasterSource,
    hwp_var: &str,
    shape: GridShape,
) -> error_stack::Result<Array2<f64>, AggregateError> {
    let acc = cycles
        .iter()
        .try_fold(NanMeanAccumulator::new(shape), |acc, cycle| {
            let sample = read_hwp_sample(cycle, hourly_dir, raster, hwp_var, shape)?;
            Ok::<_, error_stack::Report<AggregateError>>(hwp_skip_step(acc, sample))
        })?;

    log::info!(
        "HWP mean computed from {} of {} cycles",
        acc.nsamples(),
        cycles.len()
    );
    Ok(finish_hwp(&acc, shape))
}

fn read_hwp_sample(
    cycle: &Cycle,
    hourly_dir: &Path,
    raster: &RasterSource,
    hwp_var: &str,
    shape: GridShape,
) -> error_stack::Result<Option<Array2<f64>>, AggregateError> {
    let restart_path = hourly_dir.join(naming::restart_file_name(cycle));
    if !restart_path.exists() || !raster.exists(cycle) {
        log::info!("Restart or raster file not available for {cycle}, no HWP contribution");
        return Ok(None);
    }

    log::debug!("Reading HWP from {}", restart_path.display());
    let ds = netcdf::open(&restart_path).change_context_lazy(|| {
        AggregateError::context(format!("opening restart file {}", restart_path.display()))
    })?;
    let field = read_grid_field(&ds, &restart_path, hwp_var, shape).change_context_lazy(|| {
        AggregateError::context(format!("reading HWP for {cycle}"))
    })?;
    Ok(Some(field))
}

/// Daily fire fields derived from the raster files.
#[derive(Debug, Clone)]
pub struct DailyFire {
    /// Mean FRP over the hours a fire was detected, 0 where never (MW)
    pub frp_mean: Array2<f64>,
    /// Biomass burning emission rate (ug m-2 s-1)
    pub ebb_rate: Array2<f64>,
    /// Number of cycles that had a raster file
    pub nfiles: usize,
}

/// Running state for the daily FRP mean and emission total.
#[derive(Debug, Clone)]
pub struct FrpEbbAccumulator {
    frp: NanMeanAccumulator,
    ebb_total: Array2<f64>,
    nfiles: usize,
}

impl FrpEbbAccumulator {
    pub fn new(shape: GridShape) -> Self {
        Self {
            frp: NanMeanAccumulator::new(shape),
            ebb_total: shape.zeros(),
            nfiles: 0,
        }
    }

    /// The mask-to-nan step: fold in one cycle's raster.
    pub fn add(
        mut self,
        raster: &CycleRaster,
        grid: &StaticGrid,
        constants: &EmissionConstants,
    ) -> Self {
        let EmissionConstants { beta, unit_scale } = *constants;
        Zip::from(&mut self.ebb_total)
            .and(&raster.frp)
            .and(&raster.fre)
            .and(&grid.emiss_factor)
            .and(&grid.area)
            .for_each(|total, &frp, &fre, &ef, &area| {
                if frp > 0.0 {
                    *total += fre * ef * beta * unit_scale / area;
                }
            });

        let frp_masked = raster.frp.mapv(|v| if v > 0.0 { v } else { f64::NAN });
        self.frp = self.frp.add(frp_masked.view());
        self.nfiles += 1;
        self
    }

    /// The floor step: produce the final daily fields.
    pub fn finish(self, shape: GridShape) -> DailyFire {
        log::info!("Daily FRP and EBB computed from {} raster files", self.nfiles);
        if self.nfiles == 0 {
            return DailyFire {
                frp_mean: shape.zeros(),
                ebb_rate: shape.zeros(),
                nfiles: 0,
            };
        }

        let frp_mean = self.frp.mean().mapv(|v| if v > 0.0 { v } else { 0.0 });
        let ebb_rate = self.ebb_total / SECONDS_PER_DAY;
        DailyFire {
            frp_mean,
            ebb_rate,
            nfiles: self.nfiles,
        }
    }
}

/// Daily mean FRP and emission rate over `cycles`. Cycles without a raster
/// file are skipped.
pub fn daily_frp_and_ebb(
    cycles: &[Cycle],
    source: &RasterSource,
    grid: &StaticGrid,
    constants: &EmissionConstants,
) -> error_stack::Result<DailyFire, AggregateError> {
    let shape = grid.shape;
    let (acc, _) = source
        .fold_rasters(cycles, shape, FrpEbbAccumulator::new(shape), |acc, raster| {
            acc.add(raster, grid, constants)
        })
        .change_context_lazy(|| AggregateError::context("accumulating daily FRP and EBB"))?;
    Ok(acc.finish(shape))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::test_utils::{cycles, write_raster_file, write_restart_file};

    const PREFIX: &str = "intp_";

    /// Three hourly cycles on a 2x2 grid with rasters at the first and
    /// last hours only. FRE equals FRP in both.
    #[fixture]
    fn three_cycle_window() -> (TempDir, RasterSource, Vec<Cycle>) {
        let dir = tempfile::tempdir().unwrap();
        let window = cycles(&["2024060100", "2024060101", "2024060102"]);
        let frp0 = [1.0, 0.0, 0.0, 0.0];
        let frp2 = [2.0, 0.0, 0.0, 0.0];
        write_raster_file(dir.path(), PREFIX, &window[0], &frp0, &frp0, (2, 2));
        write_raster_file(dir.path(), PREFIX, &window[2], &frp2, &frp2, (2, 2));
        let source = RasterSource::new(dir.path(), PREFIX);
        (dir, source, window)
    }

    #[test]
    fn test_nan_mean_accumulator() {
        let acc = NanMeanAccumulator::new(GridShape::new(1, 3))
            .add(array![[1.0, f64::NAN, f64::NAN]].view())
            .add(array![[3.0, 4.0, f64::NAN]].view());
        let mean = acc.mean();
        assert_eq!(acc.nsamples(), 2);
        assert_abs_diff_eq!(mean[[0, 0]], 2.0);
        assert_abs_diff_eq!(mean[[0, 1]], 4.0);
        assert!(mean[[0, 2]].is_nan());
    }

    #[test]
    fn test_skip_policy() {
        let shape = GridShape::new(1, 2);
        let acc = NanMeanAccumulator::new(shape);
        let acc = hwp_skip_step(acc, None);
        assert_eq!(finish_hwp(&acc, shape), shape.zeros());

        let acc = hwp_skip_step(acc, Some(array![[2.0, 4.0]]));
        let acc = hwp_skip_step(acc, None);
        assert_eq!(finish_hwp(&acc, shape), array![[2.0, 4.0]]);
    }

    #[test]
    fn test_hwp_mean_no_contributors() {
        let hourly = tempfile::tempdir().unwrap();
        let rasters = tempfile::tempdir().unwrap();
        let source = RasterSource::new(rasters.path(), PREFIX);
        let window = cycles(&["2024060100", "2024060101"]);

        // A restart without a matching raster does not count
        write_restart_file(
            &hourly.path().join(naming::restart_file_name(&window[0])),
            &[5.0; 6],
            (2, 3),
        );

        let shape = GridShape::new(2, 3);
        let mean = hwp_daily_mean(&window, hourly.path(), &source, "rrfs_hwp_ave", shape).unwrap();
        assert_eq!(mean.dim(), (2, 3));
        assert!(mean.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_hwp_mean_single_contributor() {
        let hourly = tempfile::tempdir().unwrap();
        let rasters = tempfile::tempdir().unwrap();
        let source = RasterSource::new(rasters.path(), PREFIX);
        let window = cycles(&["2024060100", "2024060101", "2024060102"]);
        let hwp = [0.5, 1.0, 2.0, 4.0, 8.0, 16.0];

        let restart_file = hourly.path().join(naming::restart_file_name(&window[1]));
        write_restart_file(&restart_file, &hwp, (2, 3));
        write_raster_file(rasters.path(), PREFIX, &window[1], &[0.0; 6], &[0.0; 6], (2, 3));
        // Raster without a restart does not count either
        write_raster_file(rasters.path(), PREFIX, &window[2], &[0.0; 6], &[0.0; 6], (2, 3));

        let shape = GridShape::new(2, 3);
        let mean = hwp_daily_mean(&window, hourly.path(), &source, "rrfs_hwp_ave", shape).unwrap();
        let expected = Array2::from_shape_vec((2, 3), hwp.to_vec()).unwrap();
        assert_eq!(mean, expected);
    }

    #[test]
    fn test_hwp_mean_averages_contributors() {
        let hourly = tempfile::tempdir().unwrap();
        let rasters = tempfile::tempdir().unwrap();
        let source = RasterSource::new(rasters.path(), PREFIX);
        let window = cycles(&["2024060100", "2024060101"]);
        for (c, v) in window.iter().zip([1.0, 3.0]) {
            write_restart_file(&hourly.path().join(naming::restart_file_name(c)), &[v; 4], (2, 2));
            write_raster_file(rasters.path(), PREFIX, c, &[0.0; 4], &[0.0; 4], (2, 2));
        }

        let shape = GridShape::new(2, 2);
        let mean = hwp_daily_mean(&window, hourly.path(), &source, "rrfs_hwp_ave", shape).unwrap();
        assert!(mean.iter().all(|&v| v == 2.0));
    }

    #[rstest]
    fn test_end_to_end_example(three_cycle_window: (TempDir, RasterSource, Vec<Cycle>)) {
        let (_dir, source, window) = three_cycle_window;
        let shape = GridShape::new(2, 2);
        let grid = StaticGrid::uniform(shape, 1.0, 1.0);
        let constants = EmissionConstants {
            beta: 1.0,
            unit_scale: 1.0,
        };

        let daily = daily_frp_and_ebb(&window, &source, &grid, &constants).unwrap();
        assert_eq!(daily.nfiles, 2);
        assert_abs_diff_eq!(daily.ebb_rate[[0, 0]] * SECONDS_PER_DAY, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(daily.ebb_rate[[0, 0]], 3.0 / 86_400.0, epsilon = 1e-15);
        assert_abs_diff_eq!(daily.frp_mean[[0, 0]], 1.5);
        for idx in [[0usize, 1], [1, 0], [1, 1]] {
            assert_eq!(daily.frp_mean[idx], 0.0, "FRP mean at {idx:?}");
            assert_eq!(daily.ebb_rate[idx], 0.0, "EBB rate at {idx:?}");
        }
    }

    #[test]
    fn test_single_fire_hour_contribution() {
        let dir = tempfile::tempdir().unwrap();
        let window = cycles(&["2024060100", "2024060101"]);
        let shape = GridShape::new(1, 2);
        // The second cell has FRE but no FRP, so it must not count
        write_raster_file(dir.path(), PREFIX, &window[0], &[0.0, -1.0], &[50.0, 50.0], (1, 2));
        write_raster_file(dir.path(), PREFIX, &window[1], &[12.0, 0.0], &[400.0, 80.0], (1, 2));

        let mut grid = StaticGrid::uniform(shape, 9.0e6, 0.0);
        grid.emiss_factor = array![[0.05, 0.05]];
        let constants = EmissionConstants::default();
        let source = RasterSource::new(dir.path(), PREFIX);

        let daily = daily_frp_and_ebb(&window, &source, &grid, &constants).unwrap();
        let expected = (400.0 * 0.05 * 0.3 * 1.0e6 / 9.0e6) / SECONDS_PER_DAY;
        assert_abs_diff_eq!(daily.ebb_rate[[0, 0]], expected, epsilon = 1e-12);
        assert_eq!(daily.ebb_rate[[0, 1]], 0.0);
        assert_abs_diff_eq!(daily.frp_mean[[0, 0]], 12.0);
        assert_eq!(daily.frp_mean[[0, 1]], 0.0);
    }

    #[test]
    fn test_no_rasters_gives_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let shape = GridShape::new(3, 2);
        let grid = StaticGrid::uniform(shape, 1.0, 1.0);
        let source = RasterSource::new(dir.path(), PREFIX);
        let window = cycles(&["2024060100"]);

        let daily =
            daily_frp_and_ebb(&window, &source, &grid, &EmissionConstants::default()).unwrap();
        assert_eq!(daily.nfiles, 0);
        assert_eq!(daily.frp_mean, shape.zeros());
        assert_eq!(daily.ebb_rate, shape.zeros());
    }

    #[test]
    fn test_frp_floor_replaces_nan() {
        let shape = GridShape::new(1, 2);
        let grid = StaticGrid::uniform(shape, 1.0, 1.0);
        let raster = CycleRaster {
            cycle: cycles(&["2024060100"])[0],
            frp: array![[0.0, 3.0]],
            fre: array![[1.0, 1.0]],
        };
        let daily = FrpEbbAccumulator::new(shape)
            .add(&raster, &grid, &EmissionConstants::default())
            .finish(shape);
        assert_eq!(daily.frp_mean, array![[0.0, 3.0]]);
    }
}
