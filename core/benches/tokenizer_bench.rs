use criterion::{criterion_group, criterion_main, Criterion};
use mixer_core::tokenizer::tokenize;

const ARTICLE: &str = "The Matrix is a 1999 science fiction action film written and directed by \
the Wachowskis. It depicts a dystopian future in which humanity is unknowingly trapped inside a \
simulated reality, the Matrix, which intelligent machines have created to distract humans while \
using their bodies as an energy source. When computer programmer Thomas Anderson, under the \
hacker alias \"Neo\", uncovers the truth, he joins a rebellion against the machines.";

fn bench_tokenize(c: &mut Criterion) {
    let text = ARTICLE.repeat(50);
    c.bench_function("tokenize_article", |b| b.iter(|| tokenize(&text)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
