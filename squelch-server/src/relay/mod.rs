mod driver;

pub use driver::RelayDriver;
