// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::bail;
use structopt::StructOpt;

use quoll::facet::*;
use quoll::image::{write_facet_model, Image};

/// Find facet centres by iterative peak detection on an image, then split a
/// model image into per-facet models for prediction. Centres and the
/// pixel-distance matrix are cached so that create-facet-mask can reuse them.
#[derive(StructOpt, Debug)]
#[structopt(name = "create-facets")]
struct Opts {
    /// The image to find facet centres in.
    #[structopt(long, parse(from_str))]
    image: PathBuf,

    /// The model image to partition into facets.
    #[structopt(long, parse(from_str))]
    model: PathBuf,

    /// Tag used in output filenames, e.g. facet-1-<CHANNEL>-model.fits.
    #[structopt(long)]
    channel: String,

    /// Stop adding facets once the image maximum drops to this [brightness
    /// units of the image].
    #[structopt(long, default_value = "3.0")]
    threshold: f32,

    /// Minimum facet radius [degrees]. No two facet centres will be closer
    /// than this.
    #[structopt(long = "min", default_value = "0.25")]
    min_radius: f64,

    /// Maximum facet radius [degrees]. Pixels further than this from every
    /// centre belong to no facet.
    #[structopt(long = "max", default_value = "4.0")]
    max_radius: f64,

    /// Where to cache facet centres and the distance matrix.
    #[structopt(long, default_value = ".", parse(from_str))]
    cache_dir: PathBuf,
}

fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();

    let mut image = Image::open(&opts.image)?;
    let model = Image::open(&opts.model)?;
    if image.data.dim() != model.data.dim() {
        bail!(
            "The image and model have different shapes: {:?} vs {:?}",
            image.data.dim(),
            model.data.dim()
        );
    }
    let (ny, nx) = image.data.dim();

    eprint!("Calculating world coordinates of image grid... ");
    let grid = pixel_grid(&image.wcs, ny, nx);
    eprintln!("Done");

    // Reuse cached centres/distances from a previous run if they're there.
    let store = FacetStore::new(&opts.cache_dir);
    let (centres, dists) = match (store.load_centres()?, store.load_dists()?) {
        (Some(centres), Some(dists)) if dists.dim() == (centres.len(), grid.len()) => {
            eprintln!("Reusing {} cached facet centres", centres.len());
            (centres, dists)
        }
        _ => {
            let (centres, dists) = find_peak_centres(
                &mut image.data,
                &image.wcs,
                &grid,
                opts.threshold,
                opts.min_radius,
            );
            store.save_centres(&centres)?;
            store.save_dists(&dists)?;
            (centres, dists)
        }
    };
    if centres.is_empty() {
        bail!(
            "No pixels brighter than {}; no facets to make",
            opts.threshold
        );
    }

    let assignment = assign(&dists, opts.max_radius);

    // Model images of each facet (for prediction).
    for (i, centre) in centres.iter().enumerate() {
        let mut facet_data = model.data.clone();
        for (p, &a) in assignment.iter().enumerate() {
            if a != i as i32 {
                facet_data[(p / nx, p % nx)] = 0.0;
            }
        }
        let max_dist = max_distance_for(&dists, &assignment, i).unwrap_or(0.0);
        let dest = PathBuf::from(format!("facet-{}-{}-model.fits", i + 1, opts.channel));
        write_facet_model(&model.path, &dest, &facet_data, centre, max_dist)?;
    }

    Ok(())
}
