pub mod derive;
pub mod request;
pub mod selection;
pub mod session;
