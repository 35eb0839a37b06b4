//! Motor map-reduce: recibe mensajes de map/reduce, ejecuta los handlers de
//! cada step y mantiene el grafo de invocaciones en el almacén KV hasta que
//! la petición queda reducida.
//!
//! Piezas principales:
//! - `Engine`: registro del proceso (almacén, runner, transporte, config).
//! - `StepProcessor`: máquina de estados map → fan-out → reduce.
//! - `MessageFunnel`: mensaje mínimo ↔ contexto releído del almacén.
//! - `RequestLifecycle`: empaquetar, empujar y esperar peticiones.
//! - `Dispatcher`: pool de workers acotado por el crédito en vuelo.
//! - `RequestCleanup`: poda idempotente de peticiones terminadas.
pub mod admin;
pub mod cleanup;
pub mod combiner;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod funnel;
pub mod handler;
pub mod lifecycle;
pub mod native;
pub mod notify;
pub mod processor;
pub mod results;
pub mod trace;
pub mod transport;

pub use admin::WorkflowAdmin;
pub use cleanup::{schedule_cleanup, CleanupReport, RequestCleanup};
pub use config::EngineConfig;
pub use dispatcher::{DispatchStats, Dispatcher};
pub use engine::Engine;
pub use errors::EngineError;
pub use funnel::{InvocationContext, MessageFunnel};
pub use handler::{Directive, HandlerArguments, HandlerContext, HandlerItem, HandlerOutput, HandlerRunner, PairStream};
pub use lifecycle::{CompletedRequest, PackagedRequest, RequestLifecycle, SubmitOutcome};
pub use native::{NativeHandlerFn, NativeHandlerRunner};
pub use notify::{LogNotifier, Notifier};
pub use processor::{HandleOutcome, StepProcessor};
pub use results::{FileResultWriter, InlineResultWriter, ResultWriter};
pub use trace::{invocation_graph, InvocationGraph, TraceEdge, TraceNode};
pub use transport::{classify, in_memory_broker, InMemorySource, InMemoryTransport, MessageSource, RawMessage, Transport,
                    WireMessage, WIRE_FORMAT_VERSION};
