mod controller;

pub use controller::ControllerConfig;
