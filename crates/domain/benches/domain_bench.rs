use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Identifier, LabelData, PalletNumber, PalletRecordSet, PrintBatch, ProductInfo, ProductType,
    ProductTypeContext, QcDetails, Series,
};

fn aco_batch(count: u32) -> PrintBatch {
    PrintBatch::qc(
        ProductInfo::new("MHALFWG", "Half wedge", ProductType::Aco),
        "5997",
        QcDetails {
            quantity: 12,
            count,
            operator: Some("1234".to_string()),
            context: ProductTypeContext::Aco {
                order_ref: "123456".to_string(),
                new_order: false,
            },
        },
    )
}

fn identifiers(count: u32) -> Vec<Identifier> {
    (1..=count)
        .map(|seq| {
            Identifier::new(
                PalletNumber::new("20240521", seq),
                Series::new(format!("210524-B{seq:05}")).unwrap(),
            )
        })
        .collect()
}

fn bench_validate(c: &mut Criterion) {
    let batch = aco_batch(50);
    c.bench_function("domain/validate_batch", |b| {
        b.iter(|| batch.validate(100).unwrap());
    });
}

fn bench_record_sets(c: &mut Criterion) {
    let batch = aco_batch(50);
    let ids = identifiers(50);
    let now = Utc::now();

    c.bench_function("domain/build_50_record_sets", |b| {
        b.iter(|| {
            ids.iter()
                .enumerate()
                .map(|(i, id)| PalletRecordSet::build(&batch, id, i, 12, None, now))
                .collect::<Vec<_>>()
        });
    });
}

fn bench_label_data(c: &mut Criterion) {
    let batch = aco_batch(50);
    let ids = identifiers(50);

    c.bench_function("domain/label_data_50", |b| {
        b.iter(|| {
            ids.iter()
                .enumerate()
                .map(|(i, id)| LabelData::for_pallet(&batch, id, i, 12, 7).lines())
                .collect::<Vec<_>>()
        });
    });
}

criterion_group!(benches, bench_validate, bench_record_sets, bench_label_data);
criterion_main!(benches);
