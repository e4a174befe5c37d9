mod seed;

pub use seed::{RouteTable, SeedReport, load_routes, seed_role_permissions};
