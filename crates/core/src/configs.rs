//! Configuration parsing for the optional `autopush.yml` file

pub mod push;
