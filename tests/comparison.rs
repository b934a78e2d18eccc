use beaver_cmp::{
    Error,
    protocol::{simulate_comparison, simulate_comparison_with_seed},
};
use tracing_subscriber::EnvFilter;

const CASES: [(i64, i64); 6] = [(100, 50), (50, 100), (100, 100), (0, 0), (1, 0), (1000, 999)];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn compare_2pc() -> Result<(), Error> {
    init_tracing();
    for seed in [0, 0xdead_beef] {
        for (a, b) in CASES {
            let result = simulate_comparison_with_seed(a, b, 2, 32, seed).await?;
            assert_eq!(result, a > b, "{a} > {b} with seed {seed}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn compare_3pc() -> Result<(), Error> {
    init_tracing();
    for (a, b) in CASES {
        let result = simulate_comparison(a, b, 3, 32).await?;
        assert_eq!(result, a > b, "{a} > {b}");
    }
    Ok(())
}

#[tokio::test]
async fn compare_full_ring() -> Result<(), Error> {
    init_tracing();
    let max = (1 << 62) - 1;
    let min = -(1 << 62);
    let cases = [
        (max, max - 1),
        (max - 1, max),
        (max, max),
        (min, max),
        (max, min),
        (min, min),
        (min + 1, min),
    ];
    for (a, b) in cases {
        let result = simulate_comparison(a, b, 2, 64).await?;
        assert_eq!(result, a > b, "{a} > {b}");
    }
    Ok(())
}

#[tokio::test]
async fn compare_at_the_edge_of_the_bit_length() -> Result<(), Error> {
    init_tracing();
    // inputs in [-64, 64), so that a - b - 1 fits into 8 bits
    for (a, b) in [(63, 0), (0, 63), (63, -64), (-64, 63), (-64, -64), (63, 62)] {
        let result = simulate_comparison(a, b, 2, 8).await?;
        assert_eq!(result, a > b, "{a} > {b}");
    }
    Ok(())
}

#[tokio::test]
async fn compare_signed_integers() -> Result<(), Error> {
    init_tracing();
    let cases = [(-5, -10), (-10, -5), (-10, 5), (5, -10), (-1, 0), (0, -1), (-100, -100)];
    for seed in [3, 0xfeed] {
        for (a, b) in cases {
            let result = simulate_comparison_with_seed(a, b, 2, 32, seed).await?;
            assert_eq!(result, a > b, "{a} > {b} with seed {seed}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn reject_inputs_that_do_not_fit() {
    init_tracing();
    let err = simulate_comparison(64, 0, 2, 8).await.unwrap_err();
    assert!(matches!(
        err,
        Error::BitLengthTooSmall {
            bit_length: 8,
            required: 9
        }
    ));
    let err = simulate_comparison(0, -65, 2, 8).await.unwrap_err();
    assert!(matches!(err, Error::BitLengthTooSmall { required: 9, .. }));
}

#[tokio::test]
async fn reject_a_single_party() {
    init_tracing();
    let err = simulate_comparison(1, 0, 1, 32).await.unwrap_err();
    assert!(matches!(err, Error::TooFewParties(1)));
}
