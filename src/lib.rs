pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod provider;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    AcquisitionType, AuctionPeriod, Bid, BidId, BidStatus, GameId, Participant, PeriodStatus,
    RiderId, RosterEntry, TimeMs, UserId,
};
pub use error::AppError;
pub use orchestration::{Auditor, BidIntake, Finalizer, PeriodController, Scheduler};
pub use provider::{GameConfigProvider, HttpGameConfigProvider, MockGameConfigProvider};
