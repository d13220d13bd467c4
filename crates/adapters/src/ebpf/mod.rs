pub mod policy_map_manager;
