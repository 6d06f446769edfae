// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::bail;
use structopt::StructOpt;

use quoll::coords::RADec;
use quoll::facet::*;
use quoll::image::{write_facet_model, Image};

/// Partition a model image into a fixed 9-facet grid around a target
/// coordinate: 8 facets in a ring plus one at the centre. Unlike
/// create-facets, the geometry is deterministic and doesn't depend on the
/// image content. Each facet model is tagged with the facet's empirical
/// centroid rather than its geometric centre.
#[derive(StructOpt, Debug)]
#[structopt(name = "create-grid-facets")]
struct Opts {
    /// The model image to partition into facets.
    #[structopt(long, parse(from_str))]
    model: PathBuf,

    /// Tag used in output filenames, e.g. facet-1-<CHANNEL>-model.fits.
    #[structopt(long)]
    channel: String,

    /// The target coordinate the facet grid is centred on, e.g.
    /// "00:36:08 -10:34:00" (hourangle RA, degrees Dec).
    #[structopt(long)]
    center: String,

    /// The facet ring radius [degrees]: ring facets sit 2x this from the
    /// target.
    #[structopt(long, default_value = "5")]
    radius: f64,

    /// Maximum facet radius [degrees]. Pixels further than this from every
    /// centre belong to no facet.
    #[structopt(long = "max", default_value = "999")]
    max_radius: f64,

    /// Where to cache facet centres and the distance matrix.
    #[structopt(long, default_value = ".", parse(from_str))]
    cache_dir: PathBuf,
}

fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();
    let target = RADec::parse_hmsdms(&opts.center)?;

    let model = Image::open(&opts.model)?;
    let (ny, nx) = model.data.dim();

    eprint!("Calculating world coordinates of image grid... ");
    let grid = pixel_grid(&model.wcs, ny, nx);
    eprintln!("Done");

    let centres = grid_centres(&target, opts.radius);
    let store = FacetStore::new(&opts.cache_dir);
    store.save_centres(&centres)?;
    write_region_file(&PathBuf::from("facet-gridcentres.reg"), &centres, "red")?;

    eprint!("Calculating distances to facet centres... ");
    let dists = distance_matrix(&centres, &grid);
    store.save_dists(&dists)?;
    eprintln!("Done");

    let assignment = assign(&dists, opts.max_radius);

    // Model images of each facet (for prediction). The recorded centre of
    // each facet is its centroid: the ring facets get clipped by the image
    // edges and their geometric centres can sit well away from their pixels.
    let mut centroids = vec![];
    for i in 0..centres.len() {
        eprintln!("Calculating facet {}", i + 1);
        let mut facet_data = model.data.clone();
        for (p, &a) in assignment.iter().enumerate() {
            if a != i as i32 {
                facet_data[(p / nx, p % nx)] = 0.0;
            }
        }

        let centroid = match facet_centroid(&assignment, nx, i, &model.wcs) {
            Some(c) => c,
            None => bail!(
                "Facet {} contains no pixels; is the image centred on {}?",
                i + 1,
                opts.center
            ),
        };

        // Maximum distance from the centroid among this facet's pixels.
        let max_dist = assignment
            .iter()
            .zip(grid.iter())
            .filter(|(&a, _)| a == i as i32)
            .map(|(_, p)| centroid.separation(p).to_degrees())
            .fold(0.0, f64::max);

        let dest = PathBuf::from(format!("facet-{}-{}-model.fits", i + 1, opts.channel));
        write_facet_model(&model.path, &dest, &facet_data, &centroid, max_dist)?;
        centroids.push(centroid);
    }

    write_region_file(&PathBuf::from("facet-centroids.reg"), &centroids, "green")?;

    Ok(())
}
