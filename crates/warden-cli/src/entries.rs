//! Built-in entry points available to scripts.

use warden_core::{EntryFunction, EntryPointRegistry, IsolateContext};

/// Description of a built-in entry point.
pub struct BuiltinEntry {
    pub token: i64,
    pub name: &'static str,
    pub description: &'static str,
    run: fn(IsolateContext),
}

pub const BUILTIN: &[BuiltinEntry] = &[
    BuiltinEntry {
        token: 1,
        name: "idle",
        description: "Signals readiness, then waits to be killed",
        run: idle,
    },
    BuiltinEntry {
        token: 2,
        name: "silent",
        description: "Never signals readiness",
        run: silent,
    },
    BuiltinEntry {
        token: 3,
        name: "crash",
        description: "Panics before signalling readiness",
        run: crash,
    },
];

fn idle(mut ctx: IsolateContext) {
    ctx.ready();
    ctx.wait_for_termination();
    tracing::debug!("Isolate {} exiting", ctx.isolate_id());
}

fn silent(ctx: IsolateContext) {
    ctx.wait_for_termination();
}

fn crash(ctx: IsolateContext) {
    panic!("isolate {} crashed during startup", ctx.isolate_id());
}

/// Resolver over the built-in entry points.
pub fn registry() -> EntryPointRegistry<EntryFunction> {
    let mut registry = EntryPointRegistry::new();
    for entry in BUILTIN {
        registry.register(entry.token, EntryFunction::new(entry.name, entry.run));
    }
    registry
}
