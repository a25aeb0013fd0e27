// Domain layer: data passed between pipeline stages and the ports the stages depend on.

pub mod model;
pub mod ports;
