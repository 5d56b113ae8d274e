//! Multi-step form sections
//!
//! A form is split into [`Section`]s whose visibility, requiredness and
//! completion are formulas over the form data. [`SectionFlow`] tracks where the
//! user is and moves between visible sections.

mod definition;
pub mod events;
pub mod flow;
pub mod timer;

pub use definition::{FlowState, Section};
pub use events::{EventCallback, EventCollector, FlowEvent, SubscriptionId};
pub use flow::{FlowOptions, FormProgress, NavigateOptions, SectionFlow, SectionProgress};
pub use timer::{AutoAdvanceTimer, ScheduledAdvance};
