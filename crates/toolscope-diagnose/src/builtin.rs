//! Built-in rule table for ESP-IDF style embedded toolchains.
//!
//! Order matters: the first matching rule wins, so narrow rules sit above
//! broad ones (compile errors before generic linker errors, connection
//! failures before the bare "Permission denied" rule).

use toolscope_core::Severity;

use crate::error::Result;
use crate::rule::DiagnosticRule;

/// Category of the rule that recognises synthesized timeout messages.
pub const TIMEOUT_CATEGORY: &str = "timeout";

/// Builds the built-in rule table, highest priority first.
///
/// # Errors
/// Only fails if a built-in pattern does not compile.
pub fn builtin_rules() -> Result<Vec<DiagnosticRule>> {
    Ok(vec![
        // Environment
        DiagnosticRule::new(
            "toolchain_env_missing",
            "environment",
            Severity::Critical,
            "Source the toolchain export script (e.g. `. $HOME/esp/esp-idf/export.sh`) and check that IDF_PATH points at the installation",
        )
        .patterns(&[
            r"IDF_PATH.*not set",
            r"Cannot find ESP-IDF",
            r"esp-idf not found",
            r"IDF_PATH.*environment variable",
        ])?,
        DiagnosticRule::new(
            "python_version_mismatch",
            "environment",
            Severity::Critical,
            "Install Python 3.8 or newer and recreate the toolchain virtual environment",
        )
        .patterns(&[
            r"Python .* too old",
            r"requires Python .* or higher",
            r"unsupported Python version",
        ])?,
        // Build
        DiagnosticRule::new(
            "memory_overflow",
            "build",
            Severity::Critical,
            "Firmware does not fit its memory region: remove unused features, move constants to flash, and inspect usage with `idf.py size`",
        )
        .patterns(&[
            r"region.*overflow",
            r"section.*will not fit",
            r"out of memory",
            r"IRAM.*overflow",
            r"DRAM.*overflow",
            r"region .* truncated",
        ])?,
        DiagnosticRule::new(
            "compile_error",
            "build",
            Severity::Critical,
            "Fix the reported source error, check includes and CMakeLists.txt, then run `idf.py fullclean`",
        )
        .patterns(&[
            r"error:.*undefined reference",
            r"fatal error:.*No such file",
            r"compilation terminated",
        ])?,
        DiagnosticRule::new(
            "linker_error",
            "build",
            Severity::Critical,
            "Check that every source file and library is listed in CMakeLists.txt and look for duplicate symbols",
        )
        .patterns(&[
            r"undefined reference",
            r"linker command failed",
            r"ld returned",
            r"multiple definition",
        ])?,
        DiagnosticRule::new(
            "config_error",
            "build",
            Severity::Critical,
            "Review the project configuration with `idf.py menuconfig` and rebuild from clean",
        )
        .patterns(&[
            r"sdkconfig.*error",
            r"CONFIG_.*not set",
            r"undefined configuration",
            r"missing config option",
        ])?,
        // Hardware
        DiagnosticRule::new(
            "device_connection_failed",
            "hardware",
            Severity::Critical,
            "Check the physical USB connection and cable, make sure the board is powered, and confirm the serial port name",
        )
        .substring("Failed to connect")
        .substring("Port not found")
        .substring("No serial port")
        .patterns(&[
            r"Permission denied.*dev/tty",
            r"could not open port",
            r"serial\.util\.SerialException",
        ])?,
        DiagnosticRule::new(
            "serial_permission_denied",
            "hardware",
            Severity::Critical,
            "Add your user to the serial group (`sudo usermod -a -G dialout $USER`) and log in again",
        )
        .substring("Permission denied")
        .patterns(&[r"access denied.*tty", r"errno 13"])?,
        // Flash
        DiagnosticRule::new(
            "flash_write_failed",
            "flash",
            Severity::Warning,
            "Lower the baud rate (115200), use a short shielded cable, and put the chip in download mode (hold BOOT, press RESET)",
        )
        .substring("Failed to write")
        .substring("Write failed")
        .substring("Packet content transfer stops")
        .substring("timeout while waiting for packet header"),
        DiagnosticRule::new(
            "flash_size_mismatch",
            "flash",
            Severity::Warning,
            "Set the flash size under 'Serial Flasher Config' in menuconfig to match the hardware",
        )
        .patterns(&[
            r"flash size mismatch",
            r"detected size.*not matching",
            r"wrong flash size",
        ])?,
        DiagnosticRule::new(
            "connection_lost",
            "hardware",
            Severity::Warning,
            "The device dropped off the bus: check the cable and power supply, or try another USB port",
        )
        .substring("Lost connection")
        .substring("Connection lost")
        .substring("device disconnected")
        .substring("uart error"),
        // Components
        DiagnosticRule::new(
            "component_not_found",
            "build",
            Severity::Critical,
            "Register the component in CMakeLists.txt and check the component directory layout",
        )
        .patterns(&[
            r"Component.*not found",
            r"unknown component",
            r"component.*does not exist",
            r"no such component",
        ])?,
        DiagnosticRule::new(
            "dependency_unsatisfied",
            "build",
            Severity::Critical,
            "Add the missing component to REQUIRES in CMakeLists.txt and run `idf.py reconfigure`",
        )
        .patterns(&[
            r"unsatisfied dependency",
            r"dependency.*not found",
            r"required component.*missing",
        ])?,
        DiagnosticRule::new(
            "missing_file",
            "build",
            Severity::Critical,
            "A referenced file is missing: check paths in CMakeLists.txt and rerun the build",
        )
        .patterns(&[r"No such file or directory", r"'.*' does not exist"])?,
        // Cancellation
        DiagnosticRule::new(
            "operation_timeout",
            TIMEOUT_CATEGORY,
            Severity::Warning,
            "The operation exceeded its time limit: check that the device responds, or raise the timeout for this operation",
        )
        .pattern(r"operation '.*' timed out after")?,
    ])
}
