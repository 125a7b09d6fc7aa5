//! Gateway module - Load balancing and request routing

pub mod load_balancer;
pub mod router;

pub use load_balancer::{LoadBalancer, LoadBalancingStrategy};
pub use router::{GatewayRouter, RoutedRequest};
