pub mod mount_commands;
