//! Integration tests running crawlers and grids end to end

mod crawl_tests;
mod grid_tests;
