use std::{
    collections::{BTreeMap, BTreeSet},
    env,
    fs::{read_to_string, File},
    io::{BufWriter, Error, ErrorKind, Result, Write},
    str::FromStr,
};
use toml::{from_str, Value};
use tracing::{info, Level};
use lfp_opsin::{
    lfp::{spectrum::power_density, CellHost, LFPParameters, Point3, RecordedNetwork, LFP},
    protocol::{select_protocol, ProtocolParameters},
};


fn to_io_error<E: std::fmt::Display>(e: E) -> Error {
    Error::new(ErrorKind::InvalidInput, e.to_string())
}

fn parse_bool(value: &Value, field_name: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as boolean", field_name)))
}

fn parse_u64(value: &Value, field_name: &str) -> Result<u64> {
    value
        .as_integer()
        .filter(|v| *v >= 0)
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as unsigned integer", field_name)))
        .map(|v| v as u64)
}

// integers are accepted so `rho = 333` does not need a trailing point
fn parse_f64(value: &Value, field_name: &str) -> Result<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|v| v as f64))
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as float", field_name)))
}

fn parse_string(value: &Value, field_name: &str) -> Result<String> {
    value
        .as_str()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as string", field_name)))
        .map(String::from)
}

fn parse_position(value: &Value, field_name: &str) -> Result<Point3> {
    let err = || Error::new(ErrorKind::InvalidData, format!("Cannot parse {} as [x, y, z]", field_name));

    let coordinates = value.as_array().ok_or_else(err)?;
    if coordinates.len() != 3 {
        return Err(err());
    }

    let coordinates = coordinates.iter()
        .map(|i| parse_f64(i, field_name))
        .collect::<Result<Vec<f64>>>()?;

    Ok(Point3::new(coordinates[0], coordinates[1], coordinates[2]))
}

fn parse_value_with_default<T>(
    table: &Value,
    key: &str,
    parser: impl Fn(&Value, &str) -> Result<T>,
    default: T,
) -> Result<T> {
    table
        .get(key)
        .map_or(Ok(default), |value| parser(value, key))
}

fn parse_required<T>(
    table: &Value,
    key: &str,
    parser: impl Fn(&Value, &str) -> Result<T>,
) -> Result<T> {
    match table.get(key) {
        Some(value) => parser(value, key),
        None => Err(Error::new(ErrorKind::InvalidInput, format!("Requires '{}' argument", key))),
    }
}

fn parse_populations(table: &Value, network: &RecordedNetwork) -> Result<BTreeMap<String, BTreeSet<u64>>> {
    let populations = match table.get("populations") {
        Some(value) => value,
        None => {
            // every recorded cell as a single population
            let gids = network.cells.keys().copied().collect();
            return Ok(BTreeMap::from([(String::from("all"), gids)]));
        }
    };

    let populations = populations.as_table()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Cannot parse 'populations' as a table"))?;

    let mut pop_gids = BTreeMap::new();
    for (name, gids) in populations {
        let gids = gids.as_array()
            .ok_or_else(|| Error::new(ErrorKind::InvalidData, format!("Cannot parse population {} as list of gids", name)))?
            .iter()
            .map(|gid| parse_u64(gid, name))
            .collect::<Result<BTreeSet<u64>>>()?;

        pop_gids.insert(name.clone(), gids);
    }

    Ok(pop_gids)
}

fn run_protocol(protocol_table: &Value) -> Result<()> {
    let name = parse_required(protocol_table, "name", parse_string)?;
    let tag = parse_required(protocol_table, "tag", parse_string)?;
    let dt = parse_value_with_default(protocol_table, "dt", parse_f64, 0.1)?;
    info!("protocol: {}, tag: {}, dt: {}", name, tag, dt);

    // remaining keys of the table are protocol parameters, unknown keys are ignored
    let params: ProtocolParameters = protocol_table.clone()
        .try_into()
        .map_err(to_io_error)?;

    let protocol = select_protocol(&name, Some(params)).map_err(to_io_error)?;
    info!("{}", protocol.summary());

    let mut file = BufWriter::new(File::create(format!("{}_stimulus.txt", tag))?);
    writeln!(file, "run, phi, t, intensity")?;

    for run in 0..protocol.n_runs {
        for (phi_index, phi) in protocol.phis.iter().enumerate() {
            let (t, intensity) = protocol.stim_trace(run, phi_index, dt).map_err(to_io_error)?;
            for (t_i, intensity_i) in t.iter().zip(intensity.iter()) {
                writeln!(file, "{}, {}, {}, {}", run, phi, t_i, intensity_i)?;
            }
        }
    }

    file.flush()?;
    info!("Finished writing {}_stimulus.txt", tag);

    Ok(())
}

fn run_lfp(lfp_table: &Value) -> Result<()> {
    let tag = parse_required(lfp_table, "tag", parse_string)?;
    let network_file = parse_required(lfp_table, "network", parse_string)?;

    let mut network = RecordedNetwork::from_json(&read_to_string(&network_file)?)
        .map_err(to_io_error)?;
    info!("network: {} ({} cells)", network_file, network.cells.len());

    let defaults = LFPParameters::default();
    let params = LFPParameters {
        rho: parse_value_with_default(lfp_table, "rho", parse_f64, defaults.rho)?,
        fdst: parse_value_with_default(lfp_table, "fdst", parse_f64, defaults.fdst)?,
        max_e_dist: parse_value_with_default(lfp_table, "max_e_dist", parse_f64, defaults.max_e_dist)?,
        dt_lfp: parse_value_with_default(lfp_table, "dt_lfp", parse_f64, defaults.dt_lfp)?,
        seed: parse_value_with_default(lfp_table, "seed", parse_u64, defaults.seed)?,
    };
    info!("{:#?}", params);

    let position = parse_value_with_default(lfp_table, "position", parse_position, Point3::default())?;
    let t_stop = parse_value_with_default(lfp_table, "t_stop", parse_f64, network.duration())?;
    let psd = parse_value_with_default(lfp_table, "psd", parse_bool, false)?;
    let pop_gids = parse_populations(lfp_table, &network)?;

    let mut lfp = LFP::new(&tag, &mut network, &pop_gids, position, params)
        .map_err(to_io_error)?;

    lfp.run(&mut network, t_stop, |network, t| {
        network.advance_to(t);
        Ok(())
    }).map_err(to_io_error)?;

    if network.rank() != 0 {
        return Ok(());
    }

    let mut file = BufWriter::new(File::create(format!("{}_lfp.txt", tag))?);
    for (t, value) in lfp.times().iter().zip(lfp.values().iter()) {
        writeln!(file, "{}, {}", t, value)?;
    }
    file.flush()?;
    info!("Finished writing {}_lfp.txt", tag);

    if psd {
        let (frequencies, power) = power_density(lfp.values(), params.dt_lfp).map_err(to_io_error)?;

        let mut psd_file = BufWriter::new(File::create(format!("{}_lfp_psd.txt", tag))?);
        for (f, p) in frequencies.iter().zip(power.iter()) {
            writeln!(psd_file, "{}, {}", f, p)?;
        }
        psd_file.flush()?;
        info!("Finished writing {}_lfp_psd.txt", tag);
    }

    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Requires .toml argument file");
        return Err(Error::new(ErrorKind::InvalidInput, "Requires .toml argument file"));
    }

    let toml_content = read_to_string(&args[1])?;
    let config: Value = from_str(&toml_content).map_err(to_io_error)?;

    let log_level = parse_value_with_default(&config, "log_level", parse_string, String::from("info"))?;
    let level = Level::from_str(&log_level)
        .map_err(|_| Error::new(ErrorKind::InvalidInput, format!("Unknown log level: {}", log_level)))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let protocol_table = config.get("protocol");
    let lfp_table = config.get("lfp");

    if protocol_table.is_none() && lfp_table.is_none() {
        return Err(Error::new(ErrorKind::InvalidInput, "Requires 'protocol' or 'lfp' table"));
    }

    if let Some(protocol_table) = protocol_table {
        run_protocol(protocol_table)?;
    }

    if let Some(lfp_table) = lfp_table {
        run_lfp(lfp_table)?;
    }

    Ok(())
}
