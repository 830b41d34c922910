pub mod martingale;

pub use martingale::{
    Attempt, LadderReport, LadderState, MartingaleConfig, MartingaleController, MartingaleSession,
};
