pub mod device_table;
pub mod help_overlay;
pub mod locate_panel;
pub mod status_bar;
