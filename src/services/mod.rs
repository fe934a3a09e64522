pub mod order_status_poller;

pub use order_status_poller::{run_order_status_poller, StatusSink};
