mod errors;
mod files;
mod middleware;
mod users;

use httpkit::{serve, Group, Router};
use once_cell::sync::Lazy;

pub static ROOT: Lazy<Router> = Lazy::new(|| Router::new(Group::new(API_PREFIX)));

const API_PREFIX: &str = "/api";

fn main() {
    let v1 = router![Group::new("/v1"), middleware::Auth];
    users::mount(&v1);
    v1.register(files::routes());
    ROOT.register(&v1);
    serve("0.0.0.0:8080", ROOT.clone());
}
