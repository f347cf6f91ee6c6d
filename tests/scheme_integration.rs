use approx::assert_relative_eq;
use lbm_scheme::config::ConsistencyConfig;
use lbm_scheme::{
    ListingGenerator, ReportWriter, Scheme, SchemeConfig, SchemeError, parse_expr,
};
use nalgebra::DMatrix;
use std::collections::BTreeMap;

fn scheme(json: &str) -> Scheme {
    Scheme::new(SchemeConfig::from_json(json).unwrap()).unwrap()
}

fn build_error(json: &str) -> SchemeError {
    Scheme::new(SchemeConfig::from_json(json).unwrap()).unwrap_err()
}

const D1Q2: &str = r#"{
    "dim": 1,
    "scheme_velocity": "la",
    "parameters": {"la": 1.0, "s": 1.5, "u": 0.5},
    "schemes": [{
        "velocities": [1, 2],
        "conserved_moments": "rho",
        "polynomials": [1, "la*X"],
        "equilibrium": ["rho", "u*rho"],
        "relaxation_parameters": [0, "s"]
    }],
    "consistency": {"order": 2}
}"#;

fn d1q3(s: f64, c: f64) -> String {
    format!(
        r#"{{
        "dim": 1,
        "scheme_velocity": "la",
        "parameters": {{"la": 1.0, "c": {c}}},
        "schemes": [{{
            "velocities": [0, 1, 2],
            "conserved_moments": ["m0", "m1"],
            "polynomials": [1, "la*X", "X^2/2"],
            "equilibrium": ["m0", "m1", "c*m0"],
            "relaxation_parameters": [0, 0, {s}]
        }}],
        "stability": {{
            "linearization": {{"m0": 1.0, "m1": 0.0}},
            "test_monotonic_stability": true,
            "test_L2_stability": true,
            "resolution": 33
        }}
    }}"#
    )
}

#[test]
fn moment_matrices_are_inverse() {
    let scheme = scheme(&d1q3(1.9, 0.125));
    let moments = scheme.moments();
    assert!((&moments.m[0] * &moments.inv_m[0]).is_identity());
    let product = &moments.mnum_glob * &moments.inv_mnum_glob;
    let identity = DMatrix::<f64>::identity(3, 3);
    for (x, y) in product.iter().zip(identity.iter()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-12);
    }
}

#[test]
fn monotonic_verdict_follows_relaxation_entries() {
    let scheme = scheme(&d1q3(1.9, 0.125));
    let analysis = scheme.stability(&scheme.config().stability.as_ref().unwrap().linearization).unwrap();
    let all_positive = analysis.amplification_matrix_relaxation().iter().all(|&x| x >= 0.0);
    assert_eq!(analysis.is_monotonically_stable(), all_positive);
    assert!(!analysis.is_monotonically_stable());

    let relaxed = Scheme::new(SchemeConfig::from_json(&d1q3(1.0, 0.5)).unwrap()).unwrap();
    let report = relaxed.analyze().unwrap();
    assert_eq!(report.monotonically_stable, Some(true));
    assert_eq!(report.l2_stable, Some(true));
    assert!(report.consistency.is_none());
}

#[test]
fn zero_wave_vector_reduces_to_relaxation() {
    let scheme = scheme(&d1q3(1.9, 0.125));
    let analysis = scheme.stability(&BTreeMap::new()).unwrap();
    let j = analysis.amplification_matrix(&[0.0]).unwrap();
    for (z, x) in j.iter().zip(analysis.amplification_matrix_relaxation().iter()) {
        assert_relative_eq!(z.re, *x, epsilon = 1e-14);
        assert_relative_eq!(z.im, 0.0, epsilon = 1e-14);
    }
    assert_relative_eq!(analysis.spectral_radius(&[0.0]).unwrap(), 1.0, epsilon = 1e-10);
}

#[test]
fn first_order_equations_are_transport() {
    let scheme = scheme(&d1q3(1.9, 0.125));
    let result = scheme
        .consistency(&ConsistencyConfig {
            order: 1,
            linearization: BTreeMap::new(),
        })
        .unwrap();
    assert_eq!(result.order, 1);
    assert_eq!(result.laws.len(), 2);

    let m0 = result.law("m0").unwrap();
    assert_eq!(m0.lhs_sum(), parse_expr("dt*m0 + dx*m1").unwrap());
    assert!(m0.rhs.is_empty());

    let m1 = result.law("m1").unwrap();
    assert_eq!(m1.lhs_sum(), parse_expr("dt*m1 + 2*la^2*c*dx*m0").unwrap());
    assert!(m1.rhs.is_empty());
}

#[test]
fn second_order_equation_has_numerical_diffusion() {
    let scheme = scheme(D1Q2);
    let report = scheme.analyze().unwrap();
    let result = report.consistency.as_ref().unwrap();
    let rho = result.law("rho").unwrap();
    assert_eq!(rho.lhs_sum(), parse_expr("dt*rho + u*dx*rho").unwrap());
    assert_eq!(rho.rhs.len(), 1);
    assert_eq!(
        rho.rhs[0],
        parse_expr("h*(1/s - 1/2)*(la^2 - u^2)*dx^2*rho").unwrap()
    );
    assert!(result.to_string().contains("Conservation equation for rho at order 2"));
}

#[test]
fn report_files_are_written() {
    let scheme = scheme(&d1q3(1.0, 0.5));
    let analysis = scheme.analyze().unwrap();
    let mut generator = ListingGenerator::new();
    scheme.generate(&mut generator).unwrap();

    let dir = std::env::temp_dir().join(format!("lbm-scheme-report-{}", std::process::id()));
    let writer = ReportWriter::new(&lbm_scheme::config::OutputConfig {
        output_directory: dir.to_string_lossy().into_owned(),
        write_json: true,
    });
    let written = writer.write(&scheme, analysis, Some(generator.code())).unwrap();
    assert_eq!(written.len(), 3);

    let text = std::fs::read_to_string(dir.join("report.txt")).unwrap();
    assert!(text.contains("monotonically stable: yes"));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("analysis.json")).unwrap()).unwrap();
    assert_eq!(json["analysis"]["l2_stable"], serde_json::Value::Bool(true));
    assert_eq!(json["conserved_moments"][1], "m1");
    assert!(std::fs::read_to_string(dir.join("routines.txt")).unwrap().contains("transport:"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn wrong_sized_equilibrium_is_rejected() {
    let json = D1Q2.replace(r#"["rho", "u*rho"]"#, r#"["rho"]"#);
    let err = build_error(&json);
    assert!(matches!(
        err,
        SchemeError::Configuration { scheme: Some(0), ref key, .. } if key == "equilibrium"
    ));
}

#[test]
fn singular_polynomials_are_rejected() {
    let json = D1Q2.replace(r#"[1, "la*X"]"#, r#"[1, "la"]"#);
    assert!(matches!(build_error(&json), SchemeError::Algebraic { scheme: 0 }));
}

#[test]
fn unknown_conserved_moment_is_rejected() {
    let json = D1Q2.replace(r#""conserved_moments": "rho""#, r#""conserved_moments": "q""#);
    assert!(matches!(build_error(&json), SchemeError::Configuration { .. }));
}

#[test]
fn reserved_symbols_are_rejected_with_consistency() {
    let json = D1Q2.replace(r#""u": 0.5"#, r#""dx": 0.5"#).replace("u*rho", "dx*rho");
    assert!(matches!(build_error(&json), SchemeError::Configuration { .. }));
}

#[test]
fn unknown_velocity_is_rejected() {
    let json = D1Q2.replace("[1, 2]", "[1, 7]");
    assert!(matches!(build_error(&json), SchemeError::Configuration { .. }));
}

#[test]
fn invalid_dimension_is_rejected() {
    let json = D1Q2.replace(r#""dim": 1"#, r#""dim": 4"#);
    let err = build_error(&json);
    assert!(err.to_string().contains("`dim`"));
}

#[test]
fn reserved_parameter_rejected_by_consistency_call() {
    let json = D1Q2
        .replace(r#""u": 0.5"#, r#""u": 0.5, "h": 0.5"#)
        .replace("u*rho", "h*rho")
        .replace(
            r#"}],
    "consistency": {"order": 2}"#,
            "}]",
        );
    let scheme = scheme(&json);
    assert!(scheme.config().consistency.is_none());
    let err = scheme
        .consistency(&ConsistencyConfig {
            order: 2,
            linearization: BTreeMap::new(),
        })
        .unwrap_err();
    assert!(matches!(err, SchemeError::Configuration { ref key, .. } if key == "parameters"));
}

const COUPLED: &str = r#"{
    "dim": 1,
    "scheme_velocity": "la",
    "parameters": {"la": 1.0, "sr": 1.5, "sq": 1.2, "u": 0.5},
    "schemes": [
        {
            "velocities": [1, 2],
            "conserved_moments": "rho",
            "polynomials": [1, "la*X"],
            "equilibrium": ["rho", "q"],
            "relaxation_parameters": [0, "sr"]
        },
        {
            "velocities": [1, 2],
            "conserved_moments": "q",
            "polynomials": [1, "la*X"],
            "equilibrium": ["q", "u*rho"],
            "relaxation_parameters": [0, "sq"]
        }
    ],
    "consistency": {"order": 2}
}"#;

#[test]
fn coupled_schemes_exchange_fluxes() {
    let coupled = scheme(COUPLED);
    let result = coupled.analyze().unwrap().consistency.as_ref().unwrap();
    assert_eq!(result.laws.len(), 2);

    let rho = result.law("rho").unwrap();
    assert_eq!(rho.lhs_sum(), parse_expr("dt*rho + dx*q").unwrap());
    assert_eq!(rho.rhs, vec![parse_expr("h*(1/sr - 1/2)*(la^2 - u)*dx^2*rho").unwrap()]);

    let q = result.law("q").unwrap();
    assert_eq!(q.lhs_sum(), parse_expr("dt*q + dx*rho*u").unwrap());
    assert_eq!(q.rhs, vec![parse_expr("h*(1/sq - 1/2)*(la^2 - u)*dx^2*q").unwrap()]);
}

/// D2Q5 with every non-conserved moment relaxed at rate one, so the
/// relaxation matrix is `w 1^T` with weights `w = (1 - c, c/4, c/4, c/4, c/4)`.
fn d2q5(c: f64) -> String {
    format!(
        r#"{{
        "dim": 2,
        "scheme_velocity": "la",
        "parameters": {{"la": 1.0, "c": {c}, "cx": 0.1, "cy": 0.2}},
        "schemes": [{{
            "velocities": [0, 1, 2, 3, 4],
            "conserved_moments": "u",
            "polynomials": [1, "la*X", "la*Y", "X^2 + Y^2", "X^2 - Y^2"],
            "equilibrium": ["u", "cx*u", "cy*u", "c*u", 0],
            "relaxation_parameters": [0, 1, 1, 1, 1]
        }}],
        "stability": {{
            "linearization": {{"u": 1.0}},
            "test_monotonic_stability": true,
            "test_L2_stability": true,
            "resolution": 21
        }}
    }}"#
    )
}

#[test]
fn two_dimensional_sweep() {
    let stable = scheme(&d2q5(0.8));
    let stable = stable.analyze().unwrap();
    assert_eq!(stable.monotonically_stable, Some(true));
    assert_eq!(stable.l2_stable, Some(true));

    let unstable = scheme(&d2q5(2.0));
    let unstable = unstable.analyze().unwrap();
    assert_eq!(unstable.monotonically_stable, Some(false));
    assert_eq!(unstable.l2_stable, Some(false));
}

#[test]
fn two_dimensional_phase_uses_both_components() {
    use std::f64::consts::PI;

    // equilibrium fluxes vanish so the weights are exactly (-1, 1/2, 1/2, 1/2, 1/2)
    let json = d2q5(2.0).replace(r#""cx*u", "cy*u""#, "0, 0");
    let scheme = scheme(&json);
    let analysis = scheme.stability(&BTreeMap::new()).unwrap();
    assert_relative_eq!(analysis.spectral_radius(&[PI, PI]).unwrap(), 3.0, epsilon = 1e-10);
    assert_relative_eq!(analysis.spectral_radius(&[PI, 0.0]).unwrap(), 1.0, epsilon = 1e-10);
    assert!(analysis.spectral_radius(&[0.0, PI / 2.0]).unwrap() < 1e-6);
    assert!(analysis.spectral_radius(&[PI / 2.0, 0.0]).unwrap() < 1e-6);
}

#[test]
fn two_dimensional_transport() {
    let scheme = scheme(&d2q5(0.8));
    let result = scheme
        .consistency(&ConsistencyConfig {
            order: 1,
            linearization: BTreeMap::new(),
        })
        .unwrap();
    let u = result.law("u").unwrap();
    assert_eq!(u.lhs_sum(), parse_expr("dt*u + cx*dx*u + cy*dy*u").unwrap());
}
