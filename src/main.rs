extern crate wb_warehouses_sync_lib as lib;

fn main() {
    let config = lib::Config::new().unwrap_or_else(|e| lib::fail(&e.into()));
    lib::start(config);
}
