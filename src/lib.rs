pub mod aggregate;
pub mod config;
pub mod cycle;
pub mod emiss_file;
pub mod error;
pub mod fire_age;
pub mod grid;
pub mod logging;
pub mod naming;
pub mod nc_utils;
pub mod pipeline;
pub mod raster;
pub mod restart;

#[cfg(test)]
mod test_utils;
