use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eqemu_exporter::catalog::{self, Catalog};
use eqemu_exporter::encoding::line;
use eqemu_exporter::encoding::text::encode;
use eqemu_exporter::metrics::family::Family;
use eqemu_exporter::metrics::gauge::Gauge;
use eqemu_exporter::metrics::summary::Summary;
use eqemu_exporter::observation::Value;
use eqemu_exporter::registry::Registry;

pub fn text(c: &mut Criterion) {
    c.bench_function("text_encode", |b| {
        let mut registry = Registry::with_prefix("eqemu");

        let cards = Family::<Vec<(String, String)>, Gauge>::default();
        for (i, category) in catalog::default_categories().iter().enumerate() {
            cards
                .get_or_create(&vec![(
                    catalog::CATEGORY_LABEL.to_owned(),
                    category.name.clone(),
                )])
                .set(i as f64);
        }
        registry.register(catalog::CATEGORY, "Items per category", cards);

        let catalog = Catalog::new(vec![]).unwrap();
        for family in catalog.families().iter().filter(|f| f.labels().is_empty()) {
            let summary = Summary::default();
            for i in 0..1_000 {
                summary.observe(f64::from(i));
            }
            registry.register(family.name(), family.help(), summary);
        }

        let mut buffer = String::new();

        b.iter(|| {
            encode(&mut buffer, &registry).unwrap();
            black_box(&mut buffer);
            buffer.clear();
        })
    });
}

pub fn line_protocol(c: &mut Criterion) {
    c.bench_function("line_encode", |b| {
        let tags = [("category", "dragon"), ("server", "live")];
        let fields = [("value", Value::Int(1_234_567))];
        let timestamp = 1_700_000_000;
        let mut buffer = String::new();

        b.iter(|| {
            line::encode(&mut buffer, "eqemu_card_count", &tags, &fields, timestamp).unwrap();
            black_box(&mut buffer);
            buffer.clear();
        })
    });
}

criterion_group!(benches, text, line_protocol);
criterion_main!(benches);
