//! Services that drive a trace session and consume its artifact.
//!
//! - `tracer`: the `Launcher` capability, the trace session runner and log
//!   consolidation.
//! - `launchers`: concrete launchers (feature-gated).
//! - `policy`: the module-inclusion policy consulted by the builder.

pub mod launchers;
pub mod policy;
pub mod tracer;

pub use launchers::default_launcher_registry;
pub use policy::{
    get_checklist, is_parent_of_any, package_dir, recommended_plugins, recursion_targets, Advisor,
    ImplicitImports, InclusionPolicy, PluginActivation, PolicyError, RuleAdvisor,
    StaticImplicitImports,
};
pub use tracer::{
    consolidate_logs, wait_with_timeout, LaunchRequest, Launcher, LauncherRegistry, ProcessExit,
    RunnerError, TraceOptions, TraceOutcome, TraceReport, TraceSession, TracedProcess,
};
