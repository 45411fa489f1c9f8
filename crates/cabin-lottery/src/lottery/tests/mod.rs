mod common;
mod import;
