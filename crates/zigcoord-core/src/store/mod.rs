// ── Reactive storage ──
//
// Concurrent keyed storage with watch-published snapshots, shared by the
// device registry.

mod collection;

pub(crate) use collection::EntityCollection;
