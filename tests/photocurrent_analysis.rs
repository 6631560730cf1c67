#[cfg(test)]
mod test {
    use lfp_opsin::{
        error::LfpOpsinError,
        fitting::recovery_curve,
        protocol::{
            analysis::{max_conductance, ProtocolAnalysis},
            cycles_to_times, photocurrent::PhotoCurrent, select_protocol, Cycles, Protocol,
            ProtocolParameters, Pulse, ScalarOrList, TrialGrid,
        },
    };


    const DT: f64 = 1.;

    fn list(values: &[f64]) -> Option<ScalarOrList> {
        Some(ScalarOrList::List(values.to_vec()))
    }

    // simulates every trial of a protocol with the given current as a function of the
    // run, the pulses of the run and the time
    fn simulate<F>(protocol: &Protocol, current: F) -> Result<TrialGrid<PhotoCurrent>, LfpOpsinError>
    where
        F: Fn(usize, &[Pulse], f64) -> f64,
    {
        let mut trials = vec![];
        for (run, (cycles, delay)) in protocol.runs().enumerate() {
            let (pulses, total) = cycles_to_times(&cycles, delay);
            let t: Vec<f64> = (0..=(total / DT) as usize).map(|n| n as f64 * DT).collect();
            let i: Vec<f64> = t.iter().map(|t| current(run, &pulses, *t)).collect();

            let mut by_phi = vec![];
            for phi in protocol.phis.iter() {
                let mut by_v = vec![];
                for v in protocol.vs.iter() {
                    by_v.push(PhotoCurrent::new(t.clone(), i.clone(), pulses.clone(), *phi, Some(*v))?);
                }
                by_phi.push(by_v);
            }
            trials.push(by_phi);
        }

        Ok(trials)
    }

    // full peak and steady state on the first pulse, partially recovered peak on the second
    fn paired_pulse_response(pulses: &[Pulse], t: f64, gr0: f64) -> f64 {
        let (first, second) = (pulses[0], pulses[1]);
        let recovered = recovery_curve(second.start - first.end, -10., -3., gr0);

        if t == first.start {
            -10.
        } else if t > first.start && t <= first.end {
            -3.
        } else if t == second.start {
            recovered
        } else if t > second.start && t <= second.end {
            0.5 * recovered
        } else {
            0.
        }
    }

    fn recovery_protocol(vs: &[f64]) -> Result<Protocol, LfpOpsinError> {
        let params = ProtocolParameters {
            vs: list(vs),
            dt_delay: Some(50.),
            dt_on: Some(50.),
            dt_ipis: list(&[100., 200., 400., 800.]),
            dt_total: Some(2000.),
            ..ProtocolParameters::default()
        };

        Ok(select_protocol("recovery", Some(params))?)
    }

    #[test]
    fn test_max_conductance() -> Result<(), LfpOpsinError> {
        let pulses = vec![Pulse::new(5., 6.)];
        let t: Vec<f64> = (0..26).map(|n| n as f64).collect();
        let i: Vec<f64> = t.iter().map(|t| if *t == 6. { -0.7 } else { -0.1 }).collect();

        let clamped = PhotoCurrent::new(t.clone(), i.clone(), pulses.clone(), 1e20, Some(-70.))?;
        let g_max = max_conductance(&clamped, 0.).expect("clamped away from reversal");
        assert!((g_max - 1e4).abs() < 1e-6);

        let at_reversal = PhotoCurrent::new(t.clone(), i.clone(), pulses.clone(), 1e20, Some(0.))?;
        assert_eq!(max_conductance(&at_reversal, 0.), None);

        let unclamped = PhotoCurrent::new(t, i, pulses, 1e20, None)?;
        assert_eq!(max_conductance(&unclamped, 0.), None);

        Ok(())
    }

    #[test]
    fn test_delta_finish() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters { vs: list(&[-70., 0.]), ..ProtocolParameters::default() };
        let protocol = select_protocol("delta", Some(params))?;

        let trials = simulate(&protocol, |_, pulses, t| if t == pulses[0].start.ceil() { -0.35 } else { 0. })?;

        match protocol.finish(&trials, 0.)? {
            Some(ProtocolAnalysis::MaxConductance(g_maxs)) => {
                // voltages are in descending order
                assert_eq!(g_maxs[0][0][0], None);
                let g_max = g_maxs[0][0][1].expect("clamped away from reversal");
                assert!((g_max - 5000.).abs() < 1e-6);
            },
            other => panic!("expected peak conductances, found {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_resonant_frequency() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters {
            phis: list(&[1e12]),
            fs: list(&[1., 10., 100.]),
            dt_delay: Some(10.),
            cycles: Some(Cycles::Pulses(vec![vec![100., 10.]])),
            ..ProtocolParameters::default()
        };
        let protocol = select_protocol("sinusoid", Some(params))?;
        let amplitudes = [1., 5., 2.];

        let trials = simulate(&protocol, |run, pulses, t| {
            if t >= pulses[0].start && t <= pulses[0].end && (t as usize) % 2 == 0 {
                -amplitudes[run]
            } else {
                0.
            }
        })?;

        match protocol.finish(&trials, 0.)? {
            Some(ProtocolAnalysis::Resonance(resonances)) => {
                let resonance = &resonances[0][0];
                assert_eq!(resonance.fs, vec![1., 10., 100.]);
                assert_eq!(resonance.peak_amplitudes, vec![1., 5., 2.]);
                assert_eq!(resonance.steady_amplitudes, vec![1., 5., 2.]);
                assert_eq!(resonance.f_star_peak, 10.);
                assert_eq!(resonance.f_star_steady, 10.);
            },
            other => panic!("expected a resonance, found {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_short_pulse_lags() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters { pds: list(&[2., 8.]), ..ProtocolParameters::default() };
        let protocol = select_protocol("shortPulse", Some(params))?;

        // peak arrives 3 ms after the light turns off
        let trials = simulate(&protocol, |_, pulses, t| if t == pulses[0].end + 3. { -1. } else { 0. })?;

        match protocol.finish(&trials, 0.)? {
            Some(ProtocolAnalysis::ShortPulse(responses)) => {
                let responses = &responses[0][0];
                assert_eq!(responses.len(), 2);
                assert_eq!(responses[0].pulse_duration, 2.);
                assert_eq!(responses[0].lag, 5.);
                assert_eq!(responses[1].lag, 11.);
                assert_eq!(responses[1].i_peak, -1.);
            },
            other => panic!("expected short pulse responses, found {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_recovery_rate_fit() -> Result<(), LfpOpsinError> {
        let protocol = recovery_protocol(&[-70.])?;
        let gr0 = 0.004;

        let trials = simulate(&protocol, |_, pulses, t| paired_pulse_response(pulses, t, gr0))?;

        match protocol.finish(&trials, 0.)? {
            Some(ProtocolAnalysis::Recovery(fits)) => {
                let (peaks, fit) = &fits[0][0];
                assert_eq!(peaks.t_peaks, vec![100., 200., 400., 800.]);
                assert_eq!(peaks.ipeak0, -10.);
                assert_eq!(peaks.iss0, -3.);
                assert!((fit.gr0 - gr0).abs() / gr0 < 0.1);
                assert!((fit.tau_r0 - 250.).abs() < 25. / 0.9);
            },
            other => panic!("expected a recovery fit, found {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_recovery_skips_voltages_without_second_peaks() -> Result<(), LfpOpsinError> {
        let protocol = recovery_protocol(&[-70., -20.])?;
        let gr0 = 0.004;

        let mut trials = simulate(&protocol, |_, pulses, t| paired_pulse_response(pulses, t, gr0))?;

        // second voltage stops recording before the second pulse of every run
        for run in trials.iter_mut() {
            let trial = &mut run[0][1];
            let cutoff = trial.pulses[0].end + 10.;
            let n = trial.t.partition_point(|t| *t <= cutoff);
            trial.t.truncate(n);
            trial.i.truncate(n);
        }

        match protocol.finish(&trials, 0.)? {
            Some(ProtocolAnalysis::Recovery(fits)) => {
                assert_eq!(fits[0].len(), 1);
                let (peaks, fit) = &fits[0][0];
                assert_eq!(peaks.t_peaks.len(), 4);
                assert!((fit.gr0 - gr0).abs() / gr0 < 0.1);
            },
            other => panic!("expected a recovery fit, found {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn test_protocols_without_analysis() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters {
            phis: list(&[1.]),
            vs: list(&[-70.]),
            ..ProtocolParameters::default()
        };
        let protocol = select_protocol("step", Some(params))?;
        let trials = simulate(&protocol, |_, _, _| 0.)?;

        assert!(protocol.finish(&trials, 0.)?.is_none());

        Ok(())
    }

    #[test]
    fn test_missing_trials() -> Result<(), LfpOpsinError> {
        let params = ProtocolParameters { vs: list(&[-70., 0.]), ..ProtocolParameters::default() };
        let protocol = select_protocol("delta", Some(params))?;
        let mut trials = simulate(&protocol, |_, _, _| 0.)?;
        trials[0][0].pop();

        assert!(protocol.finish(&trials, 0.).is_err());

        Ok(())
    }
}
