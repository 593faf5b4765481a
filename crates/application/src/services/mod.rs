//! Application services over the delivery store.

mod driver;
mod package;

pub use driver::DriverService;
pub use package::PackageService;
