//! [`RawMotorDriver`] – sysfs `tacho-motor` driver.
//!
//! Discovery walks `<sysfs_root>/tacho-motor/motorN`, reads each device's
//! `address` to learn which output port it sits on, resets it into raw coast
//! mode and keeps three files open for the lifetime of the driver:
//! `position`, `speed` and `duty_cycle_sp`.  Every later read or write seeks
//! one of those retained handles back to the start instead of reopening the
//! file.
//!
//! The driver does no locking of its own; callers share it through
//! [`SharedHub`][crate::hub::SharedHub] so that a seek and the following
//! read or write are never interleaved with another thread's access.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use brick_types::{BrickError, BrickResult, MAX_DUTY, Port, PortRange};
use tracing::{debug, info, trace, warn};

/// sysfs class directory holding one `motorN` entry per attached motor.
pub const TACHO_MOTOR_CLASS: &str = "tacho-motor";

/// Byte offset of the port letter inside `address` (`ev3-ports:outB`).
pub const ADDRESS_PORT_OFFSET: usize = 13;

/// `duty_cycle_sp` is in percent while raw duty is in hundredths of one.
pub const DEVICE_DUTY_SCALE: i32 = 100;

const CMD_RESET: &str = "reset";
const CMD_STOP: &str = "stop";
const CMD_RUN_DIRECT: &str = "run-direct";

struct MotorFiles {
    encoder_count: File,
    encoder_rate: File,
    duty: File,
}

/// Per-port slot.  `files` is `Some` exactly while the port is connected.
#[derive(Default)]
struct MotorHandle {
    device_index: u32,
    dir: PathBuf,
    coasting: bool,
    files: Option<MotorFiles>,
}

impl MotorHandle {
    fn connected(&self) -> bool {
        self.files.is_some()
    }
}

/// Raw access to the motors found under the `tacho-motor` class.
pub struct RawMotorDriver {
    ports: PortRange,
    handles: Vec<MotorHandle>,
}

impl RawMotorDriver {
    /// A driver for `ports` with nothing attached.
    pub fn disconnected(ports: PortRange) -> Self {
        Self {
            ports,
            handles: (0..ports.len()).map(|_| MotorHandle::default()).collect(),
        }
    }

    /// Scan `<sysfs_root>/tacho-motor` and prepare every motor found on one
    /// of `ports`.
    ///
    /// # Errors
    ///
    /// Returns [`BrickError::Io`] if the class directory cannot be listed.
    /// Problems with an individual device are logged and leave its port
    /// disconnected.
    pub fn discover(sysfs_root: &Path, ports: PortRange) -> BrickResult<Self> {
        let class_dir = sysfs_root.join(TACHO_MOTOR_CLASS);
        let entries = fs::read_dir(&class_dir)
            .map_err(|e| BrickError::io(class_dir.display().to_string(), e))?;

        let mut driver = Self::disconnected(ports);
        let mut found: Vec<Option<(u32, PathBuf)>> = vec![None; ports.len()];

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Skips "." and ".." as well as anything that is not motorN.
            if name.len() <= 5 {
                continue;
            }
            match setup_device(&class_dir, &name, ports) {
                Ok((slot, device_index, dir)) => {
                    if let Some((existing, _)) = &found[slot] {
                        warn!(
                            device = device_index,
                            claimed_by = *existing,
                            "two motors report the same port; ignoring the second"
                        );
                        continue;
                    }
                    found[slot] = Some((device_index, dir));
                }
                Err(e) => warn!(device = %name, error = %e, "skipping motor device"),
            }
        }

        for (slot, entry) in found.into_iter().enumerate() {
            let Some((device_index, dir)) = entry else {
                continue;
            };
            let port = driver.port_at(slot);
            match prepare_device(&dir) {
                Ok(files) => {
                    info!(device = device_index, port = %port, "detected motor");
                    driver.handles[slot] = MotorHandle {
                        device_index,
                        dir,
                        coasting: true,
                        files: Some(files),
                    };
                }
                Err(e) => warn!(
                    device = device_index,
                    port = %port,
                    error = %e,
                    "motor setup failed; treating port as disconnected"
                ),
            }
        }

        Ok(driver)
    }

    /// Close every retained file and reset each connected motor.  All ports
    /// report [`BrickError::NoDevice`] afterwards.
    pub fn deinit(&mut self) {
        for (slot, handle) in self.handles.iter_mut().enumerate() {
            if handle.files.take().is_none() {
                continue;
            }
            handle.coasting = false;
            if let Err(e) = write_attr(&handle.dir, "command", CMD_RESET) {
                let port = self.ports.iter().nth(slot);
                warn!(port = ?port, error = %e, "motor reset failed during deinit");
            }
        }
        debug!("motor driver released");
    }

    /// The configured port range.
    pub fn ports(&self) -> PortRange {
        self.ports
    }

    /// `Ok` when a motor is attached to `port`.
    ///
    /// # Errors
    ///
    /// [`BrickError::InvalidPort`] outside the configured range,
    /// [`BrickError::NoDevice`] when nothing is attached.
    pub fn status(&self, port: Port) -> BrickResult<()> {
        self.connected_slot(port).map(|_| ())
    }

    /// sysfs device index of the motor on `port`.
    pub fn device_index(&self, port: Port) -> BrickResult<u32> {
        let slot = self.connected_slot(port)?;
        Ok(self.handles[slot].device_index)
    }

    /// Every port that currently has a motor attached.
    pub fn connected_ports(&self) -> Vec<Port> {
        self.ports
            .iter()
            .zip(&self.handles)
            .filter(|(_, h)| h.connected())
            .map(|(p, _)| p)
            .collect()
    }

    /// Whether the motor on `port` is in coast (stop) mode.
    pub fn is_coasting(&self, port: Port) -> BrickResult<bool> {
        let slot = self.connected_slot(port)?;
        Ok(self.handles[slot].coasting)
    }

    /// Let the motor spin freely.
    pub fn coast(&mut self, port: Port) -> BrickResult<()> {
        let slot = self.connected_slot(port)?;
        let handle = &mut self.handles[slot];
        write_attr(&handle.dir, "command", CMD_STOP)?;
        handle.coasting = true;
        debug!(port = %port, "coast");
        Ok(())
    }

    /// Drive the motor with a raw duty in `[-MAX_DUTY, MAX_DUTY]`.
    ///
    /// A coasting motor is switched back to `run-direct` before the duty is
    /// written.
    pub fn set_duty_cycle_raw(&mut self, port: Port, value: i32) -> BrickResult<()> {
        let slot = self.ports.index(port)?;
        if !(-MAX_DUTY..=MAX_DUTY).contains(&value) {
            return Err(BrickError::InvalidArgument);
        }
        let handle = &mut self.handles[slot];
        let Some(files) = handle.files.as_mut() else {
            return Err(BrickError::NoDevice);
        };
        if handle.coasting {
            write_attr(&handle.dir, "command", CMD_RUN_DIRECT)?;
            handle.coasting = false;
        }
        let device_value = value / DEVICE_DUTY_SCALE;
        let context = || handle.dir.join("duty_cycle_sp").display().to_string();
        write_int(&mut files.duty, device_value).map_err(|e| BrickError::io(context(), e))?;
        trace!(port = %port, raw = value, device_value, "duty written");
        Ok(())
    }

    /// Tachometer position in encoder counts.
    pub fn encoder_count_raw(&mut self, port: Port) -> BrickResult<i32> {
        let slot = self.connected_slot(port)?;
        let handle = &mut self.handles[slot];
        let Some(files) = handle.files.as_mut() else {
            return Err(BrickError::NoDevice);
        };
        read_int(&mut files.encoder_count)
            .map_err(|e| BrickError::io(handle.dir.join("position").display().to_string(), e))
    }

    /// Tachometer rate in counts per second.
    pub fn encoder_rate_raw(&mut self, port: Port) -> BrickResult<i32> {
        let slot = self.connected_slot(port)?;
        let handle = &mut self.handles[slot];
        let Some(files) = handle.files.as_mut() else {
            return Err(BrickError::NoDevice);
        };
        read_int(&mut files.encoder_rate)
            .map_err(|e| BrickError::io(handle.dir.join("speed").display().to_string(), e))
    }

    fn connected_slot(&self, port: Port) -> BrickResult<usize> {
        let slot = self.ports.index(port)?;
        if self.handles[slot].connected() {
            Ok(slot)
        } else {
            Err(BrickError::NoDevice)
        }
    }

    fn port_at(&self, slot: usize) -> Port {
        Port::from_raw(self.ports.first.raw() + slot as u8)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// sysfs helpers
// ────────────────────────────────────────────────────────────────────────────

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Work out which port slot `name` (e.g. `motor3`) is attached to.
fn setup_device(
    class_dir: &Path,
    name: &str,
    ports: PortRange,
) -> BrickResult<(usize, u32, PathBuf)> {
    let dir = class_dir.join(name);
    let device_index: u32 = name
        .get(5..)
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| {
            BrickError::io(dir.display().to_string(), invalid_data("no device index"))
        })?;

    let address_path = dir.join("address");
    let context = || address_path.display().to_string();
    let address = fs::read(&address_path).map_err(|e| BrickError::io(context(), e))?;
    let letter = *address
        .get(ADDRESS_PORT_OFFSET)
        .ok_or_else(|| BrickError::io(context(), invalid_data("address too short")))?;

    let slot = ports.index(Port::from_raw(letter))?;
    Ok((slot, device_index, dir))
}

/// Reset the motor, default its stop action to coast, put it in coast mode
/// and open the files kept for the rest of the driver's life.
fn prepare_device(dir: &Path) -> BrickResult<MotorFiles> {
    write_attr(dir, "command", CMD_RESET)?;
    write_attr(dir, "stop_action", "coast")?;
    write_attr(dir, "command", CMD_STOP)?;

    let open_read = |attr: &str| {
        let path = dir.join(attr);
        File::open(&path).map_err(|e| BrickError::io(path.display().to_string(), e))
    };
    let encoder_count = open_read("position")?;
    let encoder_rate = open_read("speed")?;
    let duty_path = dir.join("duty_cycle_sp");
    let duty = OpenOptions::new()
        .write(true)
        .open(&duty_path)
        .map_err(|e| BrickError::io(duty_path.display().to_string(), e))?;

    Ok(MotorFiles {
        encoder_count,
        encoder_rate,
        duty,
    })
}

/// Open an attribute, write `value`, close it.
fn write_attr(dir: &Path, attr: &str, value: &str) -> BrickResult<()> {
    let path = dir.join(attr);
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&path)
        .and_then(|mut f| f.write_all(value.as_bytes()))
        .map_err(|e| BrickError::io(path.display().to_string(), e))
}

/// Rewind `attr` and store `value` with a single `write` call.  sysfs hands
/// every `write` to the attribute's store handler on its own, so the number
/// and its newline must not be split across calls.
fn write_int<W: Write + Seek>(attr: &mut W, value: i32) -> io::Result<()> {
    let text = format!("{value}\n");
    attr.seek(SeekFrom::Start(0))?;
    attr.write_all(text.as_bytes())?;
    attr.flush()
}

fn read_int(file: &mut File) -> io::Result<i32> {
    file.seek(SeekFrom::Start(0))?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    let line = text.lines().next().unwrap_or("").trim();
    line.parse()
        .map_err(|_| invalid_data(format!("not an integer: {line:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSysfs;

    /// Records each `write` call separately, like a sysfs attribute.
    #[derive(Default)]
    struct AttrWrites {
        calls: Vec<String>,
    }

    impl Write for AttrWrites {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls.push(String::from_utf8_lossy(buf).into_owned());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for AttrWrites {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn duty_value_reaches_the_device_in_one_write() {
        let mut attr = AttrWrites::default();
        write_int(&mut attr, -30).unwrap();
        write_int(&mut attr, 100).unwrap();
        assert_eq!(attr.calls, vec!["-30\n".to_string(), "100\n".to_string()]);
    }

    #[test]
    fn discovers_motor_from_address_letter() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path()).with_motor(3, Port::B).build().unwrap();

        let driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();
        assert!(driver.status(Port::B).is_ok());
        assert_eq!(driver.device_index(Port::B).unwrap(), 3);
        assert_eq!(driver.connected_ports(), vec![Port::B]);
        assert!(matches!(driver.status(Port::A), Err(BrickError::NoDevice)));
        assert!(driver.is_coasting(Port::B).unwrap());

        assert_eq!(tree.attr(3, "stop_action").unwrap(), "coast");
        assert_eq!(tree.attr(3, "command").unwrap(), "stop");
    }

    #[test]
    fn last_port_in_range_is_discovered() {
        let dir = tempfile::tempdir().unwrap();
        SimSysfs::new(dir.path()).with_motor(0, Port::D).build().unwrap();
        let driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();
        assert!(driver.status(Port::D).is_ok());
    }

    #[test]
    fn invalid_port_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        SimSysfs::new(dir.path()).with_motor(0, Port::A).build().unwrap();
        let mut driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();

        let bad = Port::from_raw(b'Q');
        assert!(matches!(driver.status(bad), Err(BrickError::InvalidPort)));
        assert!(matches!(driver.coast(bad), Err(BrickError::InvalidPort)));
        assert!(matches!(driver.set_duty_cycle_raw(bad, 0), Err(BrickError::InvalidPort)));
        assert!(matches!(driver.encoder_count_raw(bad), Err(BrickError::InvalidPort)));
        assert!(matches!(driver.encoder_rate_raw(bad), Err(BrickError::InvalidPort)));
    }

    #[test]
    fn unconnected_port_reports_no_device() {
        let dir = tempfile::tempdir().unwrap();
        SimSysfs::new(dir.path()).with_motor(0, Port::A).build().unwrap();
        let mut driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();

        assert!(matches!(driver.coast(Port::C), Err(BrickError::NoDevice)));
        assert!(matches!(driver.set_duty_cycle_raw(Port::C, 100), Err(BrickError::NoDevice)));
        assert!(matches!(driver.encoder_count_raw(Port::C), Err(BrickError::NoDevice)));
        assert!(matches!(driver.encoder_rate_raw(Port::C), Err(BrickError::NoDevice)));
    }

    #[test]
    fn duty_is_written_in_device_units() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path()).with_motor(1, Port::A).build().unwrap();
        let mut driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();

        driver.set_duty_cycle_raw(Port::A, 7_550).unwrap();
        assert_eq!(tree.attr(1, "duty_cycle_sp").unwrap(), "75");

        driver.set_duty_cycle_raw(Port::A, -199).unwrap();
        assert_eq!(tree.attr(1, "duty_cycle_sp").unwrap(), "-1");
    }

    #[test]
    fn duty_out_of_range_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        SimSysfs::new(dir.path()).with_motor(1, Port::A).build().unwrap();
        let mut driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();
        assert!(matches!(
            driver.set_duty_cycle_raw(Port::A, MAX_DUTY + 1),
            Err(BrickError::InvalidArgument)
        ));
        assert!(driver.set_duty_cycle_raw(Port::A, -MAX_DUTY).is_ok());
    }

    #[test]
    fn coast_then_duty_rearms_run_direct() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path()).with_motor(2, Port::C).build().unwrap();
        let mut driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();

        driver.coast(Port::C).unwrap();
        assert_eq!(tree.attr(2, "command").unwrap(), "stop");
        assert!(driver.is_coasting(Port::C).unwrap());

        driver.set_duty_cycle_raw(Port::C, 3_000).unwrap();
        assert_eq!(tree.attr(2, "command").unwrap(), "run-direct");
        assert_eq!(tree.attr(2, "duty_cycle_sp").unwrap(), "30");
        assert!(!driver.is_coasting(Port::C).unwrap());

        // Already running: the command file is left alone.
        tree.set_attr(2, "command", "untouched").unwrap();
        driver.set_duty_cycle_raw(Port::C, 1_000).unwrap();
        assert_eq!(tree.attr(2, "command").unwrap(), "untouched");
    }

    #[test]
    fn encoder_reads_follow_device_updates() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path()).with_motor(0, Port::B).build().unwrap();
        let mut driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();

        assert_eq!(driver.encoder_count_raw(Port::B).unwrap(), 0);
        tree.set_attr(0, "position", "-360\n").unwrap();
        tree.set_attr(0, "speed", "720\n").unwrap();
        assert_eq!(driver.encoder_count_raw(Port::B).unwrap(), -360);
        assert_eq!(driver.encoder_rate_raw(Port::B).unwrap(), 720);
    }

    #[test]
    fn garbage_encoder_value_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path()).with_motor(0, Port::B).build().unwrap();
        let mut driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();
        tree.set_attr(0, "position", "twelve\n").unwrap();
        assert!(matches!(driver.encoder_count_raw(Port::B), Err(BrickError::Io { .. })));
    }

    #[test]
    fn missing_class_directory_fails_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let result = RawMotorDriver::discover(dir.path(), PortRange::MOTORS);
        assert!(matches!(result, Err(BrickError::Io { .. })));
    }

    #[test]
    fn broken_device_is_downgraded_to_no_device() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path())
            .with_motor(0, Port::A)
            .with_motor(1, Port::B)
            .build()
            .unwrap();
        // motor1 loses its duty file: setup cannot open it.
        std::fs::remove_file(tree.motor_dir(1).join("duty_cycle_sp")).unwrap();
        // motor5 has no address file at all.
        std::fs::create_dir_all(tree.motor_dir(5)).unwrap();

        let driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();
        assert!(driver.status(Port::A).is_ok());
        assert!(matches!(driver.status(Port::B), Err(BrickError::NoDevice)));
        assert_eq!(driver.connected_ports(), vec![Port::A]);
    }

    #[test]
    fn motor_outside_configured_range_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        SimSysfs::new(dir.path()).with_motor(0, Port::C).build().unwrap();
        let range = PortRange::new(Port::A, Port::B);
        let driver = RawMotorDriver::discover(dir.path(), range).unwrap();
        assert!(driver.connected_ports().is_empty());
        assert!(matches!(driver.status(Port::C), Err(BrickError::InvalidPort)));
    }

    #[test]
    fn deinit_resets_and_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let tree = SimSysfs::new(dir.path()).with_motor(4, Port::A).build().unwrap();
        let mut driver = RawMotorDriver::discover(dir.path(), PortRange::MOTORS).unwrap();
        driver.set_duty_cycle_raw(Port::A, 5_000).unwrap();

        driver.deinit();
        assert_eq!(tree.attr(4, "command").unwrap(), "reset");
        assert!(matches!(driver.status(Port::A), Err(BrickError::NoDevice)));
        assert!(matches!(driver.set_duty_cycle_raw(Port::A, 0), Err(BrickError::NoDevice)));
    }

    #[test]
    fn disconnected_driver_has_no_ports() {
        let driver = RawMotorDriver::disconnected(PortRange::MOTORS);
        assert!(driver.connected_ports().is_empty());
        assert!(matches!(driver.status(Port::A), Err(BrickError::NoDevice)));
    }
}
