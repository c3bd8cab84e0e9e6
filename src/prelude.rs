// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Everything an application usually needs, for `use zcipc::prelude::*`.

pub use crate::config::Config;
pub use crate::identity::{NodeId, UniquePortId};
pub use crate::node::{Node, NodeBuilder, NodeName, NodeState, NodeView};
pub use crate::payload::ZeroCopySend;
pub use crate::port::{AllocationStrategy, EventId, UnableToDeliverStrategy};
pub use crate::sample::{Sample, SampleMut, SampleMutUninit};
pub use crate::service::attribute::{
    AttributeKey, AttributeSet, AttributeSpecifier, AttributeValue, AttributeVerifier,
};
pub use crate::service::service_name::ServiceName;
pub use crate::service::MessagingPattern;
pub use crate::signal::SignalHandlingMode;
pub use crate::waitset::{AttachmentId, WaitSet, WaitSetBuilder, WaitSetGuard, WaitSetRunResult};
pub use crate::CallbackProgression;
