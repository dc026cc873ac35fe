mod grid_test;
mod store_test;
mod tile_request_test;
