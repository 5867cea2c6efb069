//! # Stepper Driver
//!
//! SCL 步进执行器的驱动层：连接检查、首次启动、带软件限位的运动、
//! 标定 / 回零、细分设置，以及基于恢复日志的位置持久化。
//!
//! 旋转轴（角度，经减速器）与直线轴（毫米）共用一个状态机，
//! 差异集中在 [`ActuatorKind`] 与 [`UnitConverter`] 中。
//!
//! # 使用场景
//!
//! ```no_run
//! use stepper_driver::ActuatorBuilder;
//!
//! let (mut tilt, report) = ActuatorBuilder::rotational("tilt")
//!     .port("/dev/ttyUSB0")
//!     .log_file("/home/user/stepper/tilt.log")?
//!     .start()?;
//! if report.booted {
//!     tilt.move_absolute(30.0)?;
//! }
//! # Ok::<(), stepper_driver::DriverError>(())
//! ```

mod builder;
pub mod config;
mod driver;
mod error;
pub mod kind;
pub mod record;
mod registry;
pub mod state;
pub mod target;
pub mod units;

pub use builder::ActuatorBuilder;
pub use config::DriverConfig;
pub use driver::{
    ActuatorDriver, Completion, HomingReport, LoadOutcome, MoveReport, StartupReport,
};
pub use error::{BootStage, DriverError};
pub use kind::ActuatorKind;
pub use record::{PersistedRecord, RecordError};
pub use registry::ActuatorRegistry;
pub use state::{ActuatorSnapshot, ActuatorState, ConnectionState, LIMIT_EPSILON, TravelLimits};
pub use target::MoveTarget;
pub use units::{MAX_DEVICE_STEPS, UnitConverter};
