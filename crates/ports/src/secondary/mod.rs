pub mod policy_map_port;
