mod cmdline;
mod driver;

use p4fpga_utils::FpgaResult;

fn main() -> FpgaResult<()> {
    driver::run_compiler()
}
