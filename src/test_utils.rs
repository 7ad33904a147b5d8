//! Helpers to write small synthetic netCDF inputs for unit tests.
use std::path::Path;

use netcdf::Extents;

use crate::{cycle::Cycle, naming};

pub(crate) const TIME_DIM: &str = "Time";
pub(crate) const Y_DIM: &str = "yaxis_1";
pub(crate) const X_DIM: &str = "xaxis_1";

/// One variable to write with [`write_field_file`]. Values are stored as
/// single precision, like the real restart and raster files.
pub(crate) struct TestField<'a> {
    name: &'a str,
    values: &'a [f64],
    timed: bool,
    fill: Option<f64>,
}

impl<'a> TestField<'a> {
    /// A field with a leading time dimension of length 1.
    pub(crate) fn timed(name: &'a str, values: &'a [f64]) -> Self {
        Self {
            name,
            values,
            timed: true,
            fill: None,
        }
    }

    /// A 2-D field without a time dimension.
    pub(crate) fn plain(name: &'a str, values: &'a [f64]) -> Self {
        Self {
            name,
            values,
            timed: false,
            fill: None,
        }
    }

    pub(crate) fn with_fill(mut self, fill: f64) -> Self {
        self.fill = Some(fill);
        self
    }
}

/// Write `fields` to a new netCDF file at `path` on a `(cols, rows)` grid.
pub(crate) fn write_field_file(path: &Path, fields: &[TestField], shape: (usize, usize)) {
    let (cols, rows) = shape;
    let mut ds = netcdf::create(path).expect("should be able to create test netCDF file");
    ds.add_dimension(TIME_DIM, 1).unwrap();
    ds.add_dimension(Y_DIM, cols).unwrap();
    ds.add_dimension(X_DIM, rows).unwrap();

    for field in fields {
        assert_eq!(
            field.values.len(),
            cols * rows,
            "test field {} has the wrong number of values",
            field.name
        );
        let dims: &[&str] = if field.timed {
            &[TIME_DIM, Y_DIM, X_DIM]
        } else {
            &[Y_DIM, X_DIM]
        };
        let mut var = ds.add_variable::<f32>(field.name, dims).unwrap();
        if let Some(fill) = field.fill {
            var.put_attribute("_FillValue", fill as f32).unwrap();
        }
        let values: Vec<f32> = field.values.iter().map(|&v| v as f32).collect();
        var.put_values(&values, Extents::All).unwrap();
    }
}

/// Write a restart snapshot containing the HWP field plus an unrelated
/// variable, as the forecast model would.
pub(crate) fn write_restart_file(path: &Path, hwp: &[f64], shape: (usize, usize)) {
    let other = vec![273.15; hwp.len()];
    write_field_file(
        path,
        &[
            TestField::timed("rrfs_hwp_ave", hwp),
            TestField::timed("t2m", &other),
        ],
        shape,
    );
}

/// Write an interpolated raster file for `cycle` in `dir` with the given
/// FRP and FRE values.
pub(crate) fn write_raster_file(
    dir: &Path,
    prefix: &str,
    cycle: &Cycle,
    frp: &[f64],
    fre: &[f64],
    shape: (usize, usize),
) {
    let path = dir.join(naming::intp_file_name(prefix, cycle));
    write_field_file(
        &path,
        &[
            TestField::timed("frp_avg_hr", frp),
            TestField::timed("FRE", fre),
        ],
        shape,
    );
}

pub(crate) fn cycle(s: &str) -> Cycle {
    s.parse().expect("test cycle should be valid")
}

pub(crate) fn cycles(strs: &[&str]) -> Vec<Cycle> {
    strs.iter().map(|s| cycle(s)).collect()
}
