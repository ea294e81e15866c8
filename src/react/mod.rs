//! 认知层：Actor、Judge、路由与单轮主循环

pub mod actor;
pub mod events;
pub mod judge;
pub mod loop_;
pub mod router;

pub use actor::{build_instructions, Actor};
pub use events::LoopEvent;
pub use judge::{format_conversation, Judge, Judgment};
pub use loop_::{run_superstep, SuperstepSession, TurnOutcome};
pub use router::{route_after_acting, route_after_dispatching, route_after_judging};
