pub mod health;
pub mod servers;
