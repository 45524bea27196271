use criterion::{black_box, criterion_group, criterion_main, Criterion};
use oxidized_travel::router::KeywordClassifier;

const MESSAGES: &[&str] = &[
    "Tìm khách sạn 4 sao gần biển ở Đà Nẵng cho 2 người",
    "tim quan pho ngon o ha noi",
    "Đi từ Hồ Chí Minh ra Hà Nội bằng tàu hỏa hay máy bay rẻ hơn?",
    "Lập lịch trình 3 ngày ở Huế",
    "any budget hotel near the beach?",
    "kể chuyện cười đi",
];

fn bench_classify(c: &mut Criterion) {
    let classifier = KeywordClassifier::default();

    c.bench_function("keyword_classify_mixed", |b| {
        b.iter(|| {
            for message in MESSAGES {
                black_box(classifier.classify(black_box(message)));
            }
        })
    });

    c.bench_function("keyword_classifier_build", |b| b.iter(|| black_box(KeywordClassifier::new(3))));
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
