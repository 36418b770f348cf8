use std::time::{SystemTime, UNIX_EPOCH};

use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde_json::json;
use structopt::StructOpt;

use mrview::{
    store::{Doc, DocStore, Mdb},
    view::{self, register_map, QueryOptions, ViewSpec},
};

#[derive(Debug, StructOpt)]
struct Opt {
    #[structopt(long = "load", default_value = "100000")]
    load: u64,
    #[structopt(long = "queries", default_value = "1000")]
    queries: u64,
    #[structopt(long = "reduce")]
    reduce: bool,
    #[structopt(long = "seed", default_value = "0")]
    seed: u64,
}

struct Context {
    opt: Opt,
    rng: SmallRng,
}

fn main() {
    let opt = Opt::from_args();
    let (rng, seed) = make_rng(&opt);
    let mut c = Context { opt, rng };

    println!("starting with seed = {}", seed);

    do_perf(&mut c);
}

fn do_perf(c: &mut Context) {
    register_map("perf-by-category", |doc, emitter| {
        emitter.emit(doc.body["category"].clone(), doc.body["score"].clone());
        Ok(())
    });

    let db = Mdb::new("perf");
    let ddoc = json!({
        "views": {
            "by-category": {"map": "perf-by-category"},
            "by-category-sum": {"map": "perf-by-category", "reduce": "_sum"},
        }
    });
    db.bulk_docs(vec![Doc::new("_design/perf", ddoc)]).unwrap();

    let start = SystemTime::now();
    for i in 0..c.opt.load {
        let body = json!({
            "category": c.rng.gen_range(0..1000),
            "score": c.rng.gen_range(0..100),
        });
        db.bulk_docs(vec![Doc::new(&format!("doc-{}", i), body)]).unwrap();
    }
    println!(
        "loaded `{}` with {} docs in {:?}",
        db.to_name(),
        db.len(),
        start.elapsed().unwrap()
    );

    let spec = match c.opt.reduce {
        true => ViewSpec::design("perf/by-category-sum"),
        false => ViewSpec::design("perf/by-category"),
    };

    // first query pays for building the whole index.
    let start = SystemTime::now();
    let page = view::query(&db, &spec, QueryOptions::default()).unwrap();
    println!(
        "initial query returned {} rows in {:?}",
        page.rows.len(),
        start.elapsed().unwrap()
    );

    let start = SystemTime::now();
    for _i in 0..c.opt.queries {
        let mut opts = QueryOptions::default();
        opts.set_key(json!(c.rng.gen_range(0..1000)));
        view::query(&db, &spec, opts).unwrap();
    }
    println!(
        "ran {} point queries in {:?}",
        c.opt.queries,
        start.elapsed().unwrap()
    );
}

fn make_rng(opt: &Opt) -> (SmallRng, u64) {
    let seed: u64 = if opt.seed == 0 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64
    } else {
        opt.seed
    };
    (SmallRng::seed_from_u64(seed), seed)
}
