// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docwerk-exec — Running external engines safely.
//
// `invoker` starts one process and guarantees it ends, `locator` finds engine
// executables, `governor` bounds how many run at once, and `workspace` gives
// each job a private temp directory.

pub mod governor;
pub mod invoker;
pub mod locator;
pub mod workspace;

pub use governor::{GovernedInvoker, Governor, Job, JobEvent, JobHandle, ProgressSink, QueueSnapshot};
pub use invoker::{InvokeOptions, Invocation, ProcessInvoker, ProcessOutput, SystemInvoker};
pub use locator::{ExecutableLocator, LocatedTool, ToolSpec};
pub use workspace::{JobWorkspace, PathGuard};
