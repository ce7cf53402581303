use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        WarpError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(WarpError::render("x").to_string().contains("render error:"));
    assert!(WarpError::bake("x").to_string().contains("bake error:"));
    assert!(
        WarpError::from(FitError::singular("collinear"))
            .to_string()
            .contains("model fit error: singular model: collinear")
    );
}

#[test]
fn fit_and_inversion_failures_are_soft() {
    let fit = WarpError::from(FitError::InsufficientData {
        model: "affine",
        required: 3,
        available: 2,
    });
    assert!(fit.is_soft());
    assert!(WarpError::NonInvertible { x: 1.0, y: 2.0 }.is_soft());
    assert!(!WarpError::render("boom").is_soft());
    assert!(!WarpError::bake("boom").is_soft());
}

#[test]
fn insufficient_data_message_names_model() {
    let e = FitError::InsufficientData {
        model: "similarity",
        required: 2,
        available: 1,
    };
    assert_eq!(
        e.to_string(),
        "similarity model needs 2 control points, got 1"
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = WarpError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
