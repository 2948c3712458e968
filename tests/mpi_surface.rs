#![cfg(feature = "mpi-support")]
//! Run with `mpirun -n <N> cargo test --features mpi-support --test mpi_surface`.

use surface_gather::algs::communicator::{Communicator, MpiComm};
use surface_gather::io::read_surface_csv;
use surface_gather::prelude::*;

#[test]
fn mpi_surface_write_collects_every_rank() {
    let comm = MpiComm::new().unwrap();
    let rank = comm.rank();
    let size = comm.size();

    // rank r owns r points, so rank 0 contributes nothing
    let records: Vec<LocalPointRecord> = (0..rank)
        .map(|i| LocalPointRecord::new((rank * 100 + i) as u64, [rank as f64, -(i as f64)]))
        .collect();
    let catalog = FieldCatalog::new(["Rank", "Index"]).unwrap();
    let dir = std::env::temp_dir().join("surface_gather_mpi_test");
    let cfg = SurfaceOutputConfig::new(&dir).with_coordinator(size - 1);

    let outcome = write_surface_csv(&comm, &catalog, &records, &cfg).unwrap();
    if rank == size - 1 {
        let expected = size * (size - 1) / 2;
        assert_eq!(outcome, SurfaceWriteOutcome::Written { path: cfg.path(), rows: expected });
        let csv = read_surface_csv(cfg.path()).unwrap();
        assert_eq!(csv.rows.len(), expected);
        for row in &csv.rows {
            let owner = (row.global_id / 100) as f64;
            assert_eq!(row.values[0], owner);
        }
    } else {
        assert_eq!(outcome, SurfaceWriteOutcome::Contributed { rows: rank });
    }
}
