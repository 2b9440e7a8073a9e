//! The Git Backend (spec §4.1): clone/open a bare repository, enumerate
//! branches, and provide random access to commits, trees and blobs without
//! ever materializing a working tree on disk.

mod auth;
mod backend;

pub use backend::{Backend, FileEntry};
