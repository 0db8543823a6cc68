//! Filesystem locations used by configuration loading.

pub mod xdg_root;
