use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mvcroute::router::{params, RouteDefinition, Router, RouterOptions};
use mvcroute::Request;

fn table(size: usize) -> Router {
    let mut router = Router::new(RouterOptions::default());
    let mut definitions = vec![RouteDefinition::new("/").name("Index:Index")];
    for i in 0..size {
        definitions.push(
            RouteDefinition::new(format!("/section{}/<id>[/<page>]", i))
                .name(format!("Section{}:Show", i))
                .constraint("id", r"\d+")
                .default_value("page", "1"),
        );
    }
    router.set_routes(definitions).expect("valid route table");
    router
}

fn bench_matching(c: &mut Criterion) {
    let router = table(100);

    c.bench_function("match first route", |b| {
        let request = Request::new("/section0/42");
        b.iter(|| router.request(black_box(&request)).route())
    });

    c.bench_function("match last route", |b| {
        let request = Request::new("/section99/42/3");
        b.iter(|| router.request(black_box(&request)).route())
    });

    c.bench_function("miss", |b| {
        let request = Request::new("/nowhere/at/all");
        b.iter(|| router.request(black_box(&request)).route())
    });
}

fn bench_url_building(c: &mut Criterion) {
    let router = table(100);
    let request = Request::new("/");
    let scope = router.request(&request);
    let args = params([("id", "42"), ("page", "3"), ("sort", "asc")]);

    c.bench_function("build url", |b| {
        b.iter(|| scope.url(black_box("Section50:Show"), black_box(&args)))
    });

    c.bench_function("query string fallback", |b| {
        b.iter(|| scope.url(black_box("Unknown:Target"), black_box(&args)))
    });
}

criterion_group!(benches, bench_matching, bench_url_building);
criterion_main!(benches);
