// Journal benchmarks for the KipuBank state store.
//
// Measures the cost of a committed write frame and of reverting frames of
// increasing size, which bounds what a failed withdrawal costs to undo.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use kipu_protocol::storage::JournaledState;
use kipu_protocol::{Address, VaultEvent};

fn bench_commit_frame(c: &mut Criterion) {
    let account = Address::from_label("bench");

    c.bench_function("journal/commit_deposit_frame", |b| {
        let mut state = JournaledState::new();
        b.iter(|| {
            let cp = state.checkpoint();
            state.set_reserves(state.reserves() + 1);
            state.set_balance(account, state.balance(&account) + 1);
            state.set_total_deposits(state.total_deposits() + 1);
            state.emit(VaultEvent::DepositPerformed {
                from: account,
                amount: 1,
            });
            state.commit(cp);
        });
    });
}

fn bench_revert_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal/revert_frame");

    for writes in [1usize, 16, 256] {
        let accounts: Vec<Address> = (0..writes)
            .map(|i| Address::from_label(&format!("acct-{i}")))
            .collect();

        group.throughput(Throughput::Elements(writes as u64));
        group.bench_with_input(BenchmarkId::from_parameter(writes), &accounts, |b, accounts| {
            let mut state = JournaledState::new();
            b.iter(|| {
                let cp = state.checkpoint();
                for account in accounts {
                    state.set_balance(*account, black_box(7));
                }
                state.revert(cp);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_commit_frame, bench_revert_frame);
criterion_main!(benches);
