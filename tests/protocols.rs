#[cfg(test)]
mod test {
    use std::f64::consts::PI;
    use lfp_opsin::{
        error::{LfpOpsinError, ProtocolError},
        protocol::{
            cycles_to_times, select_protocol, Cycles, PhiFunction, Protocol, ProtocolKind,
            ProtocolName, ProtocolParameters, Pulse, PulseGenerator, ScalarOrList, PROTOCOL_NAMES,
        },
    };


    fn list(values: &[f64]) -> Option<ScalarOrList> {
        Some(ScalarOrList::List(values.to_vec()))
    }

    #[test]
    fn test_single_cycle_schedule() {
        let (pulses, total) = cycles_to_times(&[[150., 100.]], 25.);

        assert_eq!(pulses, vec![Pulse::new(25., 175.)]);
        assert_eq!(total, 275.);
    }

    #[test]
    fn test_multiple_cycle_schedule() {
        let (pulses, total) = cycles_to_times(&[[10., 5.], [20., 15.], [1., 0.]], 3.);

        assert_eq!(pulses, vec![Pulse::new(3., 13.), Pulse::new(18., 38.), Pulse::new(53., 54.)]);
        assert_eq!(total, 54.);
    }

    #[test]
    fn test_every_registered_protocol_builds_with_defaults() -> Result<(), LfpOpsinError> {
        for name in PROTOCOL_NAMES {
            let protocol = select_protocol(name, None)?;

            assert_eq!(protocol.to_string(), name);
            assert!(protocol.n_runs >= 1);
            assert_eq!(protocol.phi_ts().len(), protocol.n_runs);
            for run in protocol.phi_ts() {
                assert_eq!(run.len(), protocol.n_phis());
            }
        }

        Ok(())
    }

    #[test]
    fn test_unknown_protocol() {
        assert!(matches!(
            select_protocol("squareWave", None),
            Err(ProtocolError::NotImplemented(name)) if name == "squareWave"
        ));
    }

    #[test]
    fn test_scalar_lists_are_rejected() {
        let params = ProtocolParameters { fs: Some(ScalarOrList::Scalar(5.)), ..ProtocolParameters::default() };
        assert!(matches!(
            select_protocol("sinusoid", Some(params)),
            Err(ProtocolError::UnexpectedParameterType(name)) if name == "fs"
        ));

        let params = ProtocolParameters { pds: Some(ScalarOrList::Scalar(5.)), ..ProtocolParameters::default() };
        assert!(matches!(
            select_protocol("shortPulse", Some(params)),
            Err(ProtocolError::UnexpectedParameterType(name)) if name == "pds"
        ));

        let params = ProtocolParameters { dt_ipis: Some(ScalarOrList::Scalar(5.)), ..ProtocolParameters::default() };
        assert!(matches!(
            select_protocol("recovery", Some(params)),
            Err(ProtocolError::UnexpectedParameterType(name)) if name == "dt_ipis"
        ));
    }

    #[test]
    fn test_step_defaults() -> Result<(), LfpOpsinError> {
        let protocol = select_protocol("step", None)?;

        assert_eq!(protocol.n_runs, 1);
        assert_eq!(protocol.n_phis(), 12);
        assert_eq!(protocol.n_vs(), 6);
        assert_eq!(protocol.phis[0], 5e19);
        assert_eq!(protocol.vs[0], 70.);
        assert_eq!(protocol.pulses, vec![Pulse::new(25., 175.)]);
        assert_eq!(protocol.dt_total, 275.);
        assert_eq!(protocol.shortest_period(), Some(100.));
        assert_eq!(protocol.summary(), "<step Protocol object (nRuns=1, nPhis=12, nVs=6)>");

        let container = protocol.gen_container::<f64>();
        assert_eq!(container.len(), 1);
        assert_eq!(container[0].len(), 12);
        assert_eq!(container[0][0].len(), 6);

        Ok(())
    }

    #[test]
    fn test_overrides_keep_remaining_defaults() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters { phis: list(&[1e17]), ..ProtocolParameters::default() };
        let protocol = select_protocol("step", Some(params))?;

        assert_eq!(protocol.phis, vec![1e17]);
        assert_eq!(protocol.n_vs(), 6);
        assert_eq!(protocol.dt_delay, 25.);

        Ok(())
    }

    #[test]
    fn test_step_stimulus() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters {
            phis: list(&[2.]),
            vs: list(&[-70.]),
            dt_delay: Some(5.),
            cycles: Some(Cycles::Pulse(vec![10., 5.])),
            ..ProtocolParameters::default()
        };
        let protocol = select_protocol("step", Some(params))?;

        let (t, phi) = protocol.stim_trace(0, 0, 1.)?;
        assert_eq!(t.len(), 21);
        assert_eq!(phi.len(), 21);
        assert_eq!(t[20], 20.);

        for (t_i, phi_i) in t.iter().zip(phi.iter()) {
            // the delay is sampled in darkness up to and including its last sample
            let expected = if *t_i > 5. && *t_i <= 15. { 2. } else { 0. };
            assert_eq!(*phi_i, expected, "t = {}", t_i);
        }

        assert!(matches!(protocol.stim_array(1, 0, 1.), Err(ProtocolError::RunOutOfBounds(1))));
        assert!(matches!(protocol.stim_array(0, 3, 1.), Err(ProtocolError::IntensityOutOfBounds(3))));
        assert!(matches!(protocol.stim_array(0, 0, 0.), Err(ProtocolError::InvalidTimestep)));

        Ok(())
    }

    #[test]
    fn test_sinusoid_samples() -> Result<(), LfpOpsinError> {
        let phi = 4.;
        for start_on in [false, true] {
            let params = ProtocolParameters {
                phis: list(&[phi]),
                phi0: list(&[1.]),
                fs: list(&[5.]),
                start_on: Some(start_on),
                dt_delay: Some(0.),
                cycles: Some(Cycles::Pulses(vec![vec![1000., 0.]])),
                ..ProtocolParameters::default()
            };
            let protocol = select_protocol("sinusoid", Some(params))?;

            let w = match protocol.kind() {
                ProtocolKind::Sinusoid { ws, oscillation, .. } => {
                    assert_eq!(oscillation.sr, 10000.);
                    ws[0]
                },
                _ => panic!("expected a sinusoid"),
            };
            assert!((w - 2. * PI * 5. / 1000.).abs() < 1e-15);
            assert_eq!(protocol.shortest_period(), Some(0.1));

            let spline = match &protocol.phi_ts()[0][0][0] {
                PhiFunction::Cubic(spline) => spline.clone(),
                other => panic!("expected a cubic spline, found {:?}", other),
            };
            let (x, y) = spline.knots();
            assert_eq!(x.len(), 10001);

            let sign = if start_on { 1. } else { -1. };
            for (x_i, y_i) in x.iter().zip(y.iter()).step_by(37) {
                let expected = 1. + 0.5 * phi * (1. + sign * (w * x_i).cos());
                assert!((y_i - expected).abs() < 1e-9);
                assert!((protocol.phi_ts()[0][0][0].eval(*x_i) - expected).abs() < 1e-9);
            }
        }

        Ok(())
    }

    #[test]
    fn test_sinusoid_runs_are_sorted_frequencies() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters {
            fs: list(&[50., 1., 10.]),
            cycles: Some(Cycles::Pulses(vec![vec![200., 10.]])),
            ..ProtocolParameters::default()
        };
        let protocol = select_protocol("sinusoid", Some(params))?;

        assert_eq!(protocol.n_runs, 3);
        assert_eq!(protocol.run_labels, vec!["f=1Hz", "f=10Hz", "f=50Hz"]);

        Ok(())
    }

    #[test]
    fn test_chirp_starts_at_background() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters {
            phis: list(&[2.]),
            phi0: list(&[0.5]),
            dt_delay: Some(10.),
            cycles: Some(Cycles::Pulses(vec![vec![100., 10.]])),
            f0: Some(1.),
            f_t: Some(100.),
            ..ProtocolParameters::default()
        };
        let protocol = select_protocol("chirp", Some(params))?;
        let phi_t = &protocol.phi_ts()[0][0][0];

        assert_eq!(protocol.n_runs, 1);
        // starts at its minimum as start_on defaults to false
        assert!((phi_t.eval(10.) - 0.5).abs() < 1e-9);
        assert_eq!(phi_t.eval(9.), 0.);
        assert!(phi_t.eval(60.) >= 0.5 - 1e-6 && phi_t.eval(60.) <= 2.5 + 1e-6);

        Ok(())
    }

    #[test]
    fn test_ramp() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters {
            phis: list(&[10.]),
            phi0: Some(ScalarOrList::Scalar(2.)),
            dt_delay: Some(0.),
            cycles: Some(Cycles::Pulses(vec![vec![100., 0.]])),
            ..ProtocolParameters::default()
        };
        let protocol = select_protocol("ramp", Some(params))?;
        let phi_t = &protocol.phi_ts()[0][0][0];

        assert!((phi_t.eval(0.) - 2.).abs() < 1e-12);
        assert!((phi_t.eval(50.) - 7.).abs() < 1e-12);
        assert!((phi_t.eval(100.) - 12.).abs() < 1e-12);

        Ok(())
    }

    #[test]
    fn test_delta_schedule() -> Result<(), LfpOpsinError> {
        let protocol = select_protocol("delta", None)?;

        assert_eq!(protocol.pulses, vec![Pulse::new(5., 5. + 1e-3)]);
        assert!((protocol.dt_total - 25.).abs() < 1e-12);
        assert!((protocol.dt_offs[0] - (25. - 5. - 1e-3)).abs() < 1e-12);

        let params = ProtocolParameters { dt_total: Some(4.), ..ProtocolParameters::default() };
        assert!(matches!(
            select_protocol("delta", Some(params)),
            Err(ProtocolError::InsufficientTotalDuration)
        ));

        Ok(())
    }

    #[test]
    fn test_short_pulse_runs() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters { pds: list(&[5., 1., 2.]), ..ProtocolParameters::default() };
        let protocol = select_protocol("shortPulse", Some(params))?;

        assert_eq!(protocol.n_runs, 3);
        assert_eq!(protocol.run_labels, vec!["Pulse=1ms", "Pulse=2ms", "Pulse=5ms"]);

        let (cycles, delay) = protocol.run_cycles(2)?;
        assert_eq!(cycles, vec![[5., 70.]]);
        assert_eq!(delay, 25.);
        assert!(matches!(protocol.run_cycles(3), Err(ProtocolError::RunOutOfBounds(3))));

        let totals: Vec<f64> = protocol.runs()
            .map(|(cycles, delay)| cycles_to_times(&cycles, delay).1)
            .collect();
        assert_eq!(totals, vec![100.; 3]);

        Ok(())
    }

    #[test]
    fn test_recovery_runs_fill_total_duration() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters {
            dt_ipis: list(&[1000., 500.]),
            dt_total: Some(2000.),
            ..ProtocolParameters::default()
        };
        let protocol = select_protocol("recovery", Some(params))?;

        assert_eq!(protocol.n_runs, 2);
        assert_eq!(protocol.n_pulses(), 2);

        // delay + 2 pulses + longest interval = 1300
        let (cycles, _) = protocol.run_cycles(0)?;
        assert_eq!(cycles, vec![[100., 500.], [100., 700.]]);

        for (cycles, delay) in protocol.runs() {
            let (pulses, _) = cycles_to_times(&cycles, delay);
            assert_eq!(pulses[0], Pulse::new(100., 200.));
            assert_eq!(pulses[1].start - pulses[0].end, cycles[0][1]);
        }

        Ok(())
    }

    #[test]
    fn test_custom_generator() -> Result<(), LfpOpsinError> {
        let generator = PulseGenerator::new(|run, phi, pulse| {
            PhiFunction::ramp(pulse.start, pulse.end, 0., phi * (run + 1) as f64)
        });
        let params = ProtocolParameters {
            phis: list(&[3.]),
            phi_ft: Some(generator),
            ..ProtocolParameters::default()
        };
        let protocol = Protocol::new(ProtocolName::Custom, params)?;
        let phi_t = &protocol.phi_ts()[0][0][0];

        assert!((phi_t.eval(250.) - 3.).abs() < 1e-12);
        assert!((phi_t.eval(175.) - 1.5).abs() < 1e-12);

        // without a generator pulses are square
        let protocol = select_protocol("custom", None)?;
        assert_eq!(protocol.phi_ts()[0][0][0].eval(175.), 1e17);

        Ok(())
    }

    #[test]
    fn test_parameters_from_toml() -> Result<(), LfpOpsinError> {
        let params: ProtocolParameters = toml::from_str(
            "phis = [1e16]\nvs = [-70, 10]\ncycles = [[100, 50], [100, 50]]\ndt_delay = 10\n"
        ).expect("valid parameters");

        let protocol = select_protocol("step", Some(params))?;

        assert_eq!(protocol.vs, vec![10., -70.]);
        assert_eq!(protocol.n_pulses(), 2);
        assert_eq!(protocol.dt_total, 310.);

        let params: ProtocolParameters = toml::from_str("cycles = 100\ndt_total = 300\n")
            .expect("valid parameters");
        let protocol = select_protocol("step", Some(params))?;
        assert_eq!(protocol.cycles, vec![[100., 175.]]);

        Ok(())
    }
}
