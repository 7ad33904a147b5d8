//! Access to the per-cycle interpolated FRP/FRE raster files.
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use ndarray::Array2;

use crate::{cycle::Cycle, error::NcError, grid::GridShape, naming, nc_utils::read_grid_field};

pub const DEFAULT_FRP_VAR: &str = "frp_avg_hr";
pub const DEFAULT_FRE_VAR: &str = "FRE";

/// Where the interpolated raster files live and what they call their fields.
#[derive(Debug, Clone)]
pub struct RasterSource {
    pub dir: PathBuf,
    pub prefix: String,
    pub frp_var: String,
    pub fre_var: String,
}

/// The fields of one cycle's raster file.
#[derive(Debug, Clone)]
pub struct CycleRaster {
    pub cycle: Cycle,
    /// Hourly average fire radiative power (MW)
    pub frp: Array2<f64>,
    /// Fire radiative energy
    pub fre: Array2<f64>,
}

impl RasterSource {
    /// A source using the standard variable names.
    pub fn new<P: Into<PathBuf>, S: ToString>(dir: P, prefix: S) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.to_string(),
            frp_var: DEFAULT_FRP_VAR.to_string(),
            fre_var: DEFAULT_FRE_VAR.to_string(),
        }
    }

    pub fn path_for(&self, cycle: &Cycle) -> PathBuf {
        self.dir.join(naming::intp_file_name(&self.prefix, cycle))
    }

    pub fn exists(&self, cycle: &Cycle) -> bool {
        self.path_for(cycle).exists()
    }

    /// Read the raster for `cycle`. A missing file is expected and gives
    /// `Ok(None)`; a file that exists but cannot be read is an error.
    pub fn read(
        &self,
        cycle: &Cycle,
        shape: GridShape,
    ) -> error_stack::Result<Option<CycleRaster>, NcError> {
        let path = self.path_for(cycle);
        if !path.exists() {
            log::debug!("No raster file for {cycle} at {}", path.display());
            return Ok(None);
        }

        log::debug!("Reading raster file {}", path.display());
        let raster = read_raster_file(&path, *cycle, &self.frp_var, &self.fre_var, shape)?;
        Ok(Some(raster))
    }

    /// Fold `f` over the rasters of `cycles` in order, skipping cycles that
    /// have no raster file. Returns the final state and the number of files read.
    pub fn fold_rasters<A, F>(
        &self,
        cycles: &[Cycle],
        shape: GridShape,
        init: A,
        mut f: F,
    ) -> error_stack::Result<(A, usize), NcError>
    where
        F: FnMut(A, &CycleRaster) -> A,
    {
        let mut acc = init;
        let mut nfiles = 0;
        for cycle in cycles {
            let raster = self
                .read(cycle, shape)
                .attach_printable_lazy(|| format!("reading the raster file for {cycle}"))?;
            match raster {
                Some(raster) => {
                    acc = f(acc, &raster);
                    nfiles += 1;
                }
                None => log::info!("No raster file for {cycle}, skipping"),
            }
        }
        Ok((acc, nfiles))
    }
}

fn read_raster_file(
    path: &Path,
    cycle: Cycle,
    frp_var: &str,
    fre_var: &str,
    shape: GridShape,
) -> error_stack::Result<CycleRaster, NcError> {
    let ds = netcdf::open(path).change_context_lazy(|| {
        NcError::context(format!("opening raster file {}", path.display()))
    })?;
    let frp = read_grid_field(&ds, path, frp_var, shape)?;
    let fre = read_grid_field(&ds, path, fre_var, shape)?;
    Ok(CycleRaster { cycle, frp, fre })
}
