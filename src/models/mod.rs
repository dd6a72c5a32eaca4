pub mod messages;
pub mod node;
pub mod run;
pub mod scenario;

pub use messages::*;
pub use node::*;
pub use run::*;
pub use scenario::*;
