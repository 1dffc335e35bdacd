pub mod cumulative_stat;
pub mod dhcp_lease;
pub mod monthly_stat;
